//! Job Queries

use crate::application::ports::JobStatus;

/// 获取任务状态查询
#[derive(Debug, Clone)]
pub struct GetJobStatus {
    pub job_id: String,
}

/// 获取任务日志查询（最近 `limit` 行）
#[derive(Debug, Clone)]
pub struct GetJobLogs {
    pub job_id: String,
    pub limit: Option<u32>,
}

/// 列出任务查询
#[derive(Debug, Clone, Default)]
pub struct ListJobs {
    pub status: Option<JobStatus>,
    pub project_id: Option<String>,
    pub limit: Option<u32>,
}
