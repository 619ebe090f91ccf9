//! Application State
//!
//! 包含任务控制的全部 Command/Query Handlers

use std::sync::Arc;

use crate::application::{
    // Command handlers
    CancelJobHandler, DeleteJobHandler, EnqueueJobHandler, PauseJobHandler, ResumeJobHandler,
    // Query handlers
    GetJobLogsHandler, GetJobStatusHandler, ListJobsHandler,
    // Ports
    JobQueuePort, JobRepositoryPort,
};
use crate::infrastructure::events::EventPublisher;

use super::dto::JobDefaults;

/// 应用状态
pub struct AppState {
    // ========== Ports ==========
    pub job_repo: Arc<dyn JobRepositoryPort>,
    pub job_queue: Arc<dyn JobQueuePort>,
    pub event_publisher: Arc<EventPublisher>,

    // ========== Settings ==========
    pub job_defaults: JobDefaults,
    /// `logs` 未指定 limit 时返回的行数
    pub log_tail: u32,

    // ========== Command Handlers ==========
    pub enqueue_job_handler: EnqueueJobHandler,
    pub pause_job_handler: PauseJobHandler,
    pub cancel_job_handler: CancelJobHandler,
    pub resume_job_handler: ResumeJobHandler,
    pub delete_job_handler: DeleteJobHandler,

    // ========== Query Handlers ==========
    pub get_job_status_handler: GetJobStatusHandler,
    pub get_job_logs_handler: GetJobLogsHandler,
    pub list_jobs_handler: ListJobsHandler,
}

impl AppState {
    pub fn new(
        job_repo: Arc<dyn JobRepositoryPort>,
        job_queue: Arc<dyn JobQueuePort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            job_repo: job_repo.clone(),
            job_queue: job_queue.clone(),
            event_publisher,

            job_defaults: JobDefaults::default(),
            log_tail: 100,

            enqueue_job_handler: EnqueueJobHandler::new(job_repo.clone(), job_queue.clone()),
            pause_job_handler: PauseJobHandler::new(job_repo.clone(), job_queue.clone()),
            cancel_job_handler: CancelJobHandler::new(job_repo.clone(), job_queue.clone()),
            resume_job_handler: ResumeJobHandler::new(job_repo.clone(), job_queue.clone()),
            delete_job_handler: DeleteJobHandler::new(job_repo.clone(), job_queue),

            get_job_status_handler: GetJobStatusHandler::new(job_repo.clone()),
            get_job_logs_handler: GetJobLogsHandler::new(job_repo.clone()),
            list_jobs_handler: ListJobsHandler::new(job_repo),
        }
    }

    pub fn with_job_defaults(mut self, defaults: JobDefaults) -> Self {
        self.job_defaults = defaults;
        self
    }

    pub fn with_log_tail(mut self, log_tail: u32) -> Self {
        self.log_tail = log_tail;
        self
    }
}
