//! In-Memory Lore Store
//!
//! 每个项目一个命名空间；条目 ID 为 `md5("{project}_{type}_{name}")`，
//! 重复写入同名设定会覆盖同一条目。
//! 向量为词袋哈希（固定维度、确定性），按余弦相似度排序。

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::cmp::Ordering;

use crate::application::ports::{LoreEntry, LoreStoreError, LoreStorePort, LoreType};
use crate::domain::content::Project;

/// 默认向量维度
pub const DEFAULT_DIMENSION: usize = 384;

#[derive(Debug, Clone)]
struct StoredLore {
    lore_type: LoreType,
    name: String,
    content: Value,
    embedding: Vec<f32>,
}

pub struct InMemoryLoreStore {
    dimension: usize,
    /// project_id -> (entry_id -> StoredLore)
    projects: DashMap<String, DashMap<String, StoredLore>>,
}

impl Default for InMemoryLoreStore {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl InMemoryLoreStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            projects: DashMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 项目内条目数
    pub fn len(&self, project_id: &str) -> usize {
        self.projects.get(project_id).map(|p| p.len()).unwrap_or(0)
    }

    /// 使用外部计算的向量写入单个条目
    pub fn upsert(
        &self,
        project_id: &str,
        lore_type: LoreType,
        name: &str,
        content: Value,
        embedding: Vec<f32>,
    ) -> Result<(), LoreStoreError> {
        if embedding.len() != self.dimension {
            return Err(LoreStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        self.projects
            .entry(project_id.to_string())
            .or_default()
            .insert(
                entry_id(project_id, lore_type, name),
                StoredLore {
                    lore_type,
                    name: name.to_string(),
                    content,
                    embedding: normalize(embedding),
                },
            );
        Ok(())
    }

    fn upsert_text(
        &self,
        project_id: &str,
        lore_type: LoreType,
        name: &str,
        content: Value,
    ) -> Result<(), LoreStoreError> {
        let document = format!("{} {}", name, content);
        let embedding = embed(&document, self.dimension);
        self.upsert(project_id, lore_type, name, content, embedding)
    }
}

/// 条目 ID
pub fn entry_id(project_id: &str, lore_type: LoreType, name: &str) -> String {
    let key = format!(
        "{}_{}_{}",
        project_id,
        lore_type.as_str(),
        name.trim().to_lowercase()
    );
    format!("{:x}", md5::compute(key.as_bytes()))
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
}

/// 词袋哈希向量（未归一化）
pub fn embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimension];
    for token in tokens(text) {
        let digest = md5::compute(token.as_bytes());
        let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
            % dimension;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
    vector
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

/// 已归一化向量的余弦相似度
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn to_value<T: serde::Serialize>(item: &T) -> Result<Value, LoreStoreError> {
    serde_json::to_value(item).map_err(|e| LoreStoreError::Backend(e.to_string()))
}

#[async_trait]
impl LoreStorePort for InMemoryLoreStore {
    async fn store_all(&self, project: &Project) -> Result<usize, LoreStoreError> {
        let project_id = project.id();
        let lore = &project.series.lore;
        let mut stored = 0;

        for character in &lore.characters {
            self.upsert_text(project_id, LoreType::Character, &character.name, to_value(character)?)?;
            stored += 1;
        }
        for location in &lore.locations {
            self.upsert_text(project_id, LoreType::Location, &location.name, to_value(location)?)?;
            stored += 1;
        }
        for element in &lore.world_elements {
            self.upsert_text(project_id, LoreType::WorldElement, &element.name, to_value(element)?)?;
            stored += 1;
        }

        tracing::debug!(project_id = %project_id, stored, total = self.len(project_id), "Lore stored");
        Ok(stored)
    }

    async fn query(
        &self,
        text: &str,
        project_id: &str,
        top_k: usize,
    ) -> Result<Vec<LoreEntry>, LoreStoreError> {
        let Some(entries) = self.projects.get(project_id) else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query = normalize(embed(text, self.dimension));
        let mut ranked: Vec<LoreEntry> = entries
            .iter()
            .map(|entry| LoreEntry {
                lore_type: entry.lore_type,
                name: entry.name.clone(),
                content: entry.content.clone(),
                score: cosine(&query, &entry.embedding),
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        ranked.truncate(top_k);
        Ok(ranked)
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), LoreStoreError> {
        if self.projects.remove(project_id).is_some() {
            tracing::info!(project_id = %project_id, "Lore namespace deleted");
        }
        Ok(())
    }
}
