//! Lore Store Port - 设定语义检索
//!
//! 按项目命名空间隔离；流水线只做追加和查询

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::content::Project;

/// Lore Store 错误
#[derive(Debug, Error)]
pub enum LoreStoreError {
    #[error("Lore backend error: {0}")]
    Backend(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// 设定类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoreType {
    Character,
    Location,
    WorldElement,
}

impl LoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoreType::Character => "character",
            LoreType::Location => "location",
            LoreType::WorldElement => "world_element",
        }
    }

    /// 标题形式（用于 prompt 注入）
    pub fn title(&self) -> &'static str {
        match self {
            LoreType::Character => "Character",
            LoreType::Location => "Location",
            LoreType::WorldElement => "World_Element",
        }
    }
}

/// 检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoreEntry {
    pub lore_type: LoreType,
    pub name: String,
    pub content: serde_json::Value,
    /// 相似度得分（越大越相关）
    pub score: f32,
}

/// Lore Store Port
#[async_trait]
pub trait LoreStorePort: Send + Sync {
    /// 写入项目全部设定，返回写入条目数（同名条目按 ID 覆盖为同一条）
    async fn store_all(&self, project: &Project) -> Result<usize, LoreStoreError>;

    /// 相似度检索
    async fn query(
        &self,
        text: &str,
        project_id: &str,
        top_k: usize,
    ) -> Result<Vec<LoreEntry>, LoreStoreError>;

    /// 删除项目命名空间
    async fn delete_project(&self, project_id: &str) -> Result<(), LoreStoreError>;
}

/// 把检索结果格式化为 prompt 片段
pub fn format_lore_context(entries: &[LoreEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let mut text = String::from("### ESTABLISHED LORE:\n\n");
    for entry in entries {
        let content = serde_json::to_string_pretty(&entry.content)
            .unwrap_or_else(|_| entry.content.to_string());
        text.push_str(&format!(
            "**{}: {}**\n{}\n\n",
            entry.lore_type.title(),
            entry.name,
            content
        ));
    }
    text
}
