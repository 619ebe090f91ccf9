//! Checkpoint Port - 内容树快照存储

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::content::Project;

/// Checkpoint 错误
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Checkpoint not found for project: {0}")]
    NotFound(String),

    #[error("Corrupted checkpoint {path}: {message}")]
    Corrupted { path: PathBuf, message: String },

    #[error("Versioned checkpoint already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// 版本化快照信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointInfo {
    pub path: PathBuf,
    pub iteration: u32,
    pub label: String,
}

/// Checkpoint Port
///
/// 每次保存写入一个覆盖式 latest 快照与一个不可变的版本化快照
#[async_trait]
pub trait CheckpointPort: Send + Sync {
    /// 保存快照，返回版本化文件路径
    ///
    /// 版本号取自 `project.metadata.iteration`，已存在的版本文件不会被覆盖
    async fn save(&self, project: &Project, label: &str) -> Result<PathBuf, CheckpointError>;

    /// 读取 latest 快照
    async fn load(&self, project_id: &str) -> Result<Project, CheckpointError>;

    /// 读取指定迭代号的版本化快照
    async fn load_version(&self, project_id: &str, iteration: u32)
        -> Result<Project, CheckpointError>;

    /// 列出全部版本化快照（按迭代号升序）
    async fn list(&self, project_id: &str) -> Result<Vec<CheckpointInfo>, CheckpointError>;

    /// 是否存在 latest 快照
    async fn exists(&self, project_id: &str) -> bool;

    /// 写入致命错误报告
    async fn write_error_report(
        &self,
        project_id: &str,
        report: &serde_json::Value,
    ) -> Result<PathBuf, CheckpointError>;
}
