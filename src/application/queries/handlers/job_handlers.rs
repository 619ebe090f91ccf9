//! Job Query Handlers

use std::sync::Arc;

use serde::Serialize;

use crate::application::error::ApplicationError;
use crate::application::ports::{JobConfig, JobFilter, JobLogEntry, JobRecord, JobRepositoryPort};
use crate::application::queries::{GetJobLogs, GetJobStatus, ListJobs};

/// 未指定时返回的日志行数
pub const DEFAULT_LOG_LIMIT: u32 = 100;

// ============================================================================
// Response DTOs
// ============================================================================

/// 任务详情响应
#[derive(Debug, Clone, Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub project_id: String,
    pub status: String,
    pub current_stage: Option<String>,
    pub completed_stage: Option<String>,
    pub progress_percent: u8,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
    pub config: JobConfig,
    pub created_at: String,
}

impl From<JobRecord> for JobResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            project_id: record.project_id,
            status: record.status.as_str().to_string(),
            current_stage: record.current_stage.map(|s| s.as_str().to_string()),
            completed_stage: record.completed_stage.map(|s| s.as_str().to_string()),
            progress_percent: record.progress_percent,
            started_at: record.started_at.map(|t| t.to_rfc3339()),
            completed_at: record.completed_at.map(|t| t.to_rfc3339()),
            error_message: record.error_message,
            config: record.config,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

/// 日志行响应
#[derive(Debug, Clone, Serialize)]
pub struct JobLogResponse {
    pub timestamp: String,
    pub line: String,
}

impl From<JobLogEntry> for JobLogResponse {
    fn from(entry: JobLogEntry) -> Self {
        Self {
            timestamp: entry.timestamp.to_rfc3339(),
            line: entry.line,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GetJobStatus Handler
pub struct GetJobStatusHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
}

impl GetJobStatusHandler {
    pub fn new(job_repo: Arc<dyn JobRepositoryPort>) -> Self {
        Self { job_repo }
    }

    pub async fn handle(&self, query: GetJobStatus) -> Result<JobResponse, ApplicationError> {
        let job = self
            .job_repo
            .find_by_id(&query.job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", &query.job_id))?;

        Ok(JobResponse::from(job))
    }
}

/// GetJobLogs Handler
pub struct GetJobLogsHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
}

impl GetJobLogsHandler {
    pub fn new(job_repo: Arc<dyn JobRepositoryPort>) -> Self {
        Self { job_repo }
    }

    pub async fn handle(&self, query: GetJobLogs) -> Result<Vec<JobLogResponse>, ApplicationError> {
        // 验证任务存在
        self.job_repo
            .find_by_id(&query.job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", &query.job_id))?;

        let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
        if limit == 0 {
            return Err(ApplicationError::validation("limit must be at least 1"));
        }

        let lines = self.job_repo.tail_logs(&query.job_id, limit).await?;
        Ok(lines.into_iter().map(JobLogResponse::from).collect())
    }
}

/// ListJobs Handler
pub struct ListJobsHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
}

impl ListJobsHandler {
    pub fn new(job_repo: Arc<dyn JobRepositoryPort>) -> Self {
        Self { job_repo }
    }

    pub async fn handle(&self, query: ListJobs) -> Result<Vec<JobResponse>, ApplicationError> {
        let filter = JobFilter {
            status: query.status,
            project_id: query.project_id,
            limit: query.limit,
        };
        let jobs = self.job_repo.list(&filter).await?;
        Ok(jobs.into_iter().map(JobResponse::from).collect())
    }
}
