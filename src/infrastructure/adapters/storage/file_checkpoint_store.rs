//! File Checkpoint Store - 文件系统快照存储
//!
//! 实现 CheckpointPort trait
//!
//! 目录结构:
//! - `{project_id}_state.json`: latest 快照（临时文件 + rename 原子覆盖）
//! - `{project_id}_v{iteration:03}_{label}.json`: 不可变版本化快照
//! - `{project_id}_error_{timestamp}.json`: 致命错误报告

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::application::ports::{CheckpointError, CheckpointInfo, CheckpointPort};
use crate::domain::content::Project;

/// 文件系统快照存储
pub struct FileCheckpointStore {
    base_dir: PathBuf,
}

fn io_error(e: std::io::Error) -> CheckpointError {
    CheckpointError::Io(e.to_string())
}

impl FileCheckpointStore {
    /// 创建存储，确保目录存在
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).await.map_err(io_error)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn state_path(&self, project_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}_state.json", project_id))
    }

    pub fn version_path(&self, project_id: &str, iteration: u32, label: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}_v{:03}_{}.json", project_id, iteration, label))
    }

    /// 先写临时文件再 rename，读者不会看到半个文件
    async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CheckpointError> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data).await.map_err(io_error)?;
        fs::rename(&tmp, path).await.map_err(io_error)
    }

    async fn read_project(path: &Path) -> Result<Project, CheckpointError> {
        let data = fs::read(path).await.map_err(io_error)?;
        serde_json::from_slice(&data).map_err(|e| CheckpointError::Corrupted {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// 解析版本化文件名，返回 (iteration, label)
fn parse_version_name(project_id: &str, file_name: &str) -> Option<(u32, String)> {
    let rest = file_name
        .strip_prefix(project_id)?
        .strip_prefix("_v")?
        .strip_suffix(".json")?;
    let (digits, label) = rest.split_once('_')?;
    if digits.len() < 3 || !digits.chars().all(|c| c.is_ascii_digit()) || label.is_empty() {
        return None;
    }
    Some((digits.parse().ok()?, label.to_string()))
}

#[async_trait]
impl CheckpointPort for FileCheckpointStore {
    async fn save(&self, project: &Project, label: &str) -> Result<PathBuf, CheckpointError> {
        let project_id = project.id();
        let iteration = project.metadata.iteration;
        let version_path = self.version_path(project_id, iteration, label);

        if fs::try_exists(&version_path).await.map_err(io_error)? {
            return Err(CheckpointError::AlreadyExists(version_path));
        }

        let data = serde_json::to_vec_pretty(project)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;

        Self::write_atomic(&version_path, &data).await?;
        Self::write_atomic(&self.state_path(project_id), &data).await?;

        tracing::info!(
            project_id = %project_id,
            iteration,
            label = %label,
            path = %version_path.display(),
            "Checkpoint saved"
        );
        Ok(version_path)
    }

    async fn load(&self, project_id: &str) -> Result<Project, CheckpointError> {
        let path = self.state_path(project_id);
        if !fs::try_exists(&path).await.map_err(io_error)? {
            return Err(CheckpointError::NotFound(project_id.to_string()));
        }
        let project = Self::read_project(&path).await?;
        tracing::debug!(
            project_id = %project_id,
            iteration = project.metadata.iteration,
            "Checkpoint loaded"
        );
        Ok(project)
    }

    async fn load_version(
        &self,
        project_id: &str,
        iteration: u32,
    ) -> Result<Project, CheckpointError> {
        let info = self
            .list(project_id)
            .await?
            .into_iter()
            .find(|info| info.iteration == iteration)
            .ok_or_else(|| {
                CheckpointError::NotFound(format!("{} iteration {}", project_id, iteration))
            })?;
        Self::read_project(&info.path).await
    }

    async fn list(&self, project_id: &str) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut entries = fs::read_dir(&self.base_dir).await.map_err(io_error)?;
        let mut versions = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some((iteration, label)) = parse_version_name(project_id, file_name) {
                versions.push(CheckpointInfo {
                    path: entry.path(),
                    iteration,
                    label,
                });
            }
        }

        versions.sort_by_key(|v| v.iteration);
        Ok(versions)
    }

    async fn exists(&self, project_id: &str) -> bool {
        fs::try_exists(self.state_path(project_id))
            .await
            .unwrap_or(false)
    }

    async fn write_error_report(
        &self,
        project_id: &str,
        report: &serde_json::Value,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.base_dir.join(format!(
            "{}_error_{}.json",
            project_id,
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        ));
        let data = serde_json::to_vec_pretty(report)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        fs::write(&path, data).await.map_err(io_error)?;

        tracing::warn!(project_id = %project_id, path = %path.display(), "Error report written");
        Ok(path)
    }
}
