//! Job Repository Port - 任务持久化
//!
//! 任务状态与滚动日志写入持久存储，进程重启后仍可查询
//! 具体实现在 infrastructure 层（SQLite）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::content::Stage;

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 等待执行
    Queued,
    /// 执行中
    Running,
    /// 已暂停（可恢复）
    Paused,
    /// 已完成
    Completed,
    /// 执行失败
    Failed,
    /// 已取消
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "paused" => Some(JobStatus::Paused),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// 是否为终态（paused 不是终态）
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// pause / cancel 仅对活动任务有效
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

/// 系列概念（流水线输入）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub title: String,
    pub premise: String,
    pub genre: String,
}

impl Concept {
    /// 解析概念文本：第 1-3 行依次为标题、前提、类型
    pub fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let title = lines.next()?.to_string();
        let premise = lines.next()?.to_string();
        let genre = lines.next().unwrap_or("General Fiction").to_string();
        Some(Self {
            title,
            premise,
            genre,
        })
    }
}

/// 任务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub concept: Concept,
    pub book_count: u32,
    pub chapters_per_book: u32,
    pub target_word_count: u32,
    pub scenes_per_chapter: u32,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_use_lore")]
    pub use_lore: bool,
    /// 从该阶段之后继续（该阶段已完成）
    #[serde(default)]
    pub resume_from: Option<Stage>,
}

fn default_preset() -> String {
    "balanced".to_string()
}

fn default_use_lore() -> bool {
    true
}

/// 任务记录
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub job_id: String,
    pub project_id: String,
    pub status: JobStatus,
    /// 正在执行的阶段
    pub current_stage: Option<Stage>,
    /// 最近完整完成的阶段（恢复点）
    pub completed_stage: Option<Stage>,
    pub progress_percent: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub config: JobConfig,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(project_id: impl Into<String>, config: JobConfig) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            status: JobStatus::Queued,
            current_stage: None,
            completed_stage: config.resume_from,
            progress_percent: config.resume_from.map(|s| s.progress_percent()).unwrap_or(0),
            started_at: None,
            completed_at: None,
            error_message: None,
            config,
            created_at: Utc::now(),
        }
    }
}

/// 任务字段更新（None 表示不修改）
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub current_stage: Option<Stage>,
    pub completed_stage: Option<Stage>,
    pub progress_percent: Option<u8>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// 任务日志行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobLogEntry {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

/// 任务列表过滤条件
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub project_id: Option<String>,
    pub limit: Option<u32>,
}

/// Job Repository Port
#[async_trait]
pub trait JobRepositoryPort: Send + Sync {
    /// 创建任务
    async fn create(&self, job: &JobRecord) -> Result<(), RepositoryError>;

    /// 根据 ID 查找任务
    async fn find_by_id(&self, job_id: &str) -> Result<Option<JobRecord>, RepositoryError>;

    /// 更新任务字段
    ///
    /// 首次进入 running 时写入 started_at，进入终态时写入 completed_at
    async fn update(&self, job_id: &str, update: &JobUpdate) -> Result<(), RepositoryError>;

    /// 追加日志行
    async fn append_log(&self, job_id: &str, line: &str) -> Result<(), RepositoryError>;

    /// 最近 `limit` 条日志（按时间正序）
    async fn tail_logs(&self, job_id: &str, limit: u32) -> Result<Vec<JobLogEntry>, RepositoryError>;

    /// 列出任务（按创建时间倒序）
    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, RepositoryError>;

    /// 删除任务及其日志
    async fn delete(&self, job_id: &str) -> Result<(), RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_str() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Paused,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::from_str(status.as_str()), Some(status));
        }
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());
        assert!(JobStatus::Queued.is_active());
    }

    #[test]
    fn test_concept_parse() {
        let concept = Concept::parse("Tidebound\n\nA drowned empire rises.\nFantasy\nextra").unwrap();
        assert_eq!(concept.title, "Tidebound");
        assert_eq!(concept.premise, "A drowned empire rises.");
        assert_eq!(concept.genre, "Fantasy");

        assert!(Concept::parse("only a title").is_none());
    }
}
