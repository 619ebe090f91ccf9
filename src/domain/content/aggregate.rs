//! Content Context - Aggregate Root

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProjectStatus, Series, Stage};
use crate::domain::assessment::GateRecord;

/// 快照格式版本
pub const SCHEMA_VERSION: &str = "1.0";

/// 项目元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub project_id: String,
    /// 最近一次提交所在阶段
    pub processing_stage: Stage,
    /// 最近一次完整完成的阶段
    #[serde(default)]
    pub completed_stage: Option<Stage>,
    #[serde(default)]
    pub status: ProjectStatus,
    /// 快照迭代号，每次提交递增
    #[serde(default)]
    pub iteration: u32,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub last_updated_by: String,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// 修订历史条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionEntry {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub scope: String,
    pub changes_summary: String,
    pub reason: String,
}

/// Project 聚合根
///
/// 不变量:
/// - 内容树只由运行中的任务持有和修改
/// - 已提交的结构只追加，不删除；修订替换字段值，不替换节点
/// - 评审报告只追加到历史，不直接修改内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub metadata: Metadata,
    pub series: Series,
    #[serde(default)]
    pub qa_reports: Vec<GateRecord>,
    #[serde(default)]
    pub revision_history: Vec<RevisionEntry>,
}

impl Project {
    /// 创建新项目（尚未执行任何阶段）
    pub fn new(project_id: impl Into<String>, series: Series) -> Self {
        Self {
            metadata: Metadata {
                schema_version: default_schema_version(),
                project_id: project_id.into(),
                processing_stage: Stage::Series,
                completed_stage: None,
                status: ProjectStatus::Draft,
                iteration: 0,
                last_updated: Utc::now(),
                last_updated_by: "pipeline".to_string(),
            },
            series,
            qa_reports: Vec::new(),
            revision_history: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.project_id
    }

    /// 标记进入某阶段的修改
    pub fn touch(&mut self, stage: Stage, updated_by: &str) {
        self.metadata.processing_stage = stage;
        self.metadata.last_updated = Utc::now();
        self.metadata.last_updated_by = updated_by.to_string();
    }

    /// 分配下一个快照迭代号
    pub fn next_iteration(&mut self) -> u32 {
        self.metadata.iteration += 1;
        self.metadata.iteration
    }

    /// 记录一次修订
    pub fn record_revision(
        &mut self,
        agent: &str,
        scope: impl Into<String>,
        changes_summary: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.revision_history.push(RevisionEntry {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            scope: scope.into(),
            changes_summary: changes_summary.into(),
            reason: reason.into(),
        });
    }

    /// 正文提交后重新汇总字数
    pub fn rollup_word_counts(&mut self) {
        self.series.rollup_word_counts();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_creation() {
        let project = Project::new("demo", Series::from_concept("Title", "Premise", "Fantasy"));
        assert_eq!(project.id(), "demo");
        assert_eq!(project.metadata.iteration, 0);
        assert_eq!(project.metadata.completed_stage, None);
        assert_eq!(project.metadata.schema_version, "1.0");
    }

    #[test]
    fn test_next_iteration_monotonic() {
        let mut project = Project::new("demo", Series::from_concept("T", "P", "G"));
        assert_eq!(project.next_iteration(), 1);
        assert_eq!(project.next_iteration(), 2);
    }

    #[test]
    fn test_load_ignores_unknown_fields() {
        let json = r#"{
            "metadata": {
                "project_id": "p1",
                "processing_stage": "book",
                "status": "draft",
                "iteration": 4,
                "last_updated": "2025-01-01T00:00:00Z",
                "editorial_status": "draft"
            },
            "series": {"title": "T", "premise": "P", "genre": "G", "raw_text": "ignored"},
            "editorial_reports": []
        }"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(project.metadata.iteration, 4);
        assert_eq!(project.metadata.processing_stage, Stage::Book);
        assert!(project.series.books.is_empty());
    }
}
