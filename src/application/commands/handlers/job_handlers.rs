//! Job Command Handlers

use std::sync::Arc;

use crate::application::commands::{CancelJob, DeleteJob, EnqueueJob, PauseJob, ResumeJob};
use crate::application::error::ApplicationError;
use crate::application::model_config::Preset;
use crate::application::ports::{
    ControlRequest, JobConfig, JobQueuePort, JobRecord, JobRepositoryPort, JobStatus, JobUpdate,
};
use crate::domain::content::Stage;

/// 项目 ID 会出现在检查点文件名里，只允许字母数字、`-` 与 `_`
pub fn validate_project_id(project_id: &str) -> Result<(), ApplicationError> {
    if project_id.is_empty() {
        return Err(ApplicationError::validation("project_id must not be empty"));
    }
    if !project_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApplicationError::validation(format!(
            "project_id '{}' may only contain letters, digits, '-' and '_'",
            project_id
        )));
    }
    Ok(())
}

pub fn validate_job_config(config: &JobConfig) -> Result<(), ApplicationError> {
    if config.concept.title.trim().is_empty() {
        return Err(ApplicationError::validation("concept title must not be empty"));
    }
    if config.concept.premise.trim().is_empty() {
        return Err(ApplicationError::validation("concept premise must not be empty"));
    }
    if config.book_count == 0 {
        return Err(ApplicationError::validation("book_count must be at least 1"));
    }
    if config.chapters_per_book == 0 {
        return Err(ApplicationError::validation("chapters_per_book must be at least 1"));
    }
    if config.scenes_per_chapter == 0 {
        return Err(ApplicationError::validation("scenes_per_chapter must be at least 1"));
    }
    if config.target_word_count < config.book_count * config.chapters_per_book {
        return Err(ApplicationError::validation(
            "target_word_count is too small for the requested number of chapters",
        ));
    }
    if Preset::from_str(&config.preset).is_none() {
        return Err(ApplicationError::validation(format!(
            "unknown model preset '{}'",
            config.preset
        )));
    }
    Ok(())
}

// ============================================================================
// EnqueueJob
// ============================================================================

/// 入队响应
#[derive(Debug, Clone)]
pub struct EnqueueJobResponse {
    pub job_id: String,
    pub project_id: String,
    pub status: JobStatus,
}

/// EnqueueJob Handler - 持久化任务记录后放入 FIFO 队列
pub struct EnqueueJobHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    job_queue: Arc<dyn JobQueuePort>,
}

impl EnqueueJobHandler {
    pub fn new(job_repo: Arc<dyn JobRepositoryPort>, job_queue: Arc<dyn JobQueuePort>) -> Self {
        Self { job_repo, job_queue }
    }

    pub async fn handle(&self, command: EnqueueJob) -> Result<EnqueueJobResponse, ApplicationError> {
        validate_project_id(&command.project_id)?;
        validate_job_config(&command.config)?;

        let job = JobRecord::new(command.project_id, command.config);
        self.job_repo.create(&job).await?;
        self.job_repo
            .append_log(
                &job.job_id,
                &format!("Job queued for project {}", job.project_id),
            )
            .await?;
        self.job_queue.push(&job.job_id)?;

        tracing::info!(
            job_id = %job.job_id,
            project_id = %job.project_id,
            resume_from = ?job.config.resume_from,
            "Job enqueued"
        );

        Ok(EnqueueJobResponse {
            job_id: job.job_id,
            project_id: job.project_id,
            status: job.status,
        })
    }
}

// ============================================================================
// PauseJob / CancelJob
// ============================================================================

/// 控制命令响应
#[derive(Debug, Clone)]
pub struct ControlJobResponse {
    pub job_id: String,
    pub status: JobStatus,
    /// true: 任务正在执行，请求将在下一个边界生效
    pub deferred: bool,
}

/// 对活动任务施加控制请求
///
/// 执行中的任务只设置标志，由 worker 在边界处落状态；
/// 排队中的任务直接改状态，worker 取到后跳过
async fn apply_control(
    job_repo: &dyn JobRepositoryPort,
    job_queue: &dyn JobQueuePort,
    job_id: &str,
    request: ControlRequest,
) -> Result<ControlJobResponse, ApplicationError> {
    let job = job_repo
        .find_by_id(job_id)
        .await?
        .ok_or_else(|| ApplicationError::not_found("Job", job_id))?;

    let verb = match request {
        ControlRequest::Pause => "pause",
        ControlRequest::Cancel => "cancel",
    };
    if !job.status.is_active() {
        return Err(ApplicationError::invalid_state(format!(
            "cannot {} job {} in status {}",
            verb,
            job_id,
            job.status.as_str()
        )));
    }

    if job.status == JobStatus::Running || job_queue.is_active(job_id) {
        job_queue.request(job_id, request);
        job_repo
            .append_log(job_id, &format!("{} requested", capitalize(verb)))
            .await?;
        tracing::info!(job_id = %job_id, request = verb, "Control request recorded");
        return Ok(ControlJobResponse {
            job_id: job_id.to_string(),
            status: job.status,
            deferred: true,
        });
    }

    let status = match request {
        ControlRequest::Pause => JobStatus::Paused,
        ControlRequest::Cancel => JobStatus::Cancelled,
    };
    job_repo.update(job_id, &JobUpdate::status(status)).await?;
    job_repo
        .append_log(job_id, &format!("Job {} while queued", status.as_str()))
        .await?;
    tracing::info!(job_id = %job_id, status = status.as_str(), "Queued job updated");

    Ok(ControlJobResponse {
        job_id: job_id.to_string(),
        status,
        deferred: false,
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// PauseJob Handler
pub struct PauseJobHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    job_queue: Arc<dyn JobQueuePort>,
}

impl PauseJobHandler {
    pub fn new(job_repo: Arc<dyn JobRepositoryPort>, job_queue: Arc<dyn JobQueuePort>) -> Self {
        Self { job_repo, job_queue }
    }

    pub async fn handle(&self, command: PauseJob) -> Result<ControlJobResponse, ApplicationError> {
        apply_control(
            self.job_repo.as_ref(),
            self.job_queue.as_ref(),
            &command.job_id,
            ControlRequest::Pause,
        )
        .await
    }
}

/// CancelJob Handler
pub struct CancelJobHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    job_queue: Arc<dyn JobQueuePort>,
}

impl CancelJobHandler {
    pub fn new(job_repo: Arc<dyn JobRepositoryPort>, job_queue: Arc<dyn JobQueuePort>) -> Self {
        Self { job_repo, job_queue }
    }

    pub async fn handle(&self, command: CancelJob) -> Result<ControlJobResponse, ApplicationError> {
        apply_control(
            self.job_repo.as_ref(),
            self.job_queue.as_ref(),
            &command.job_id,
            ControlRequest::Cancel,
        )
        .await
    }
}

// ============================================================================
// ResumeJob
// ============================================================================

/// 恢复响应
#[derive(Debug, Clone)]
pub struct ResumeJobResponse {
    pub previous_job_id: String,
    pub job_id: String,
    pub resume_from: Option<Stage>,
}

/// ResumeJob Handler - 以最近完成的阶段为恢复点创建新任务
pub struct ResumeJobHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    job_queue: Arc<dyn JobQueuePort>,
}

impl ResumeJobHandler {
    pub fn new(job_repo: Arc<dyn JobRepositoryPort>, job_queue: Arc<dyn JobQueuePort>) -> Self {
        Self { job_repo, job_queue }
    }

    pub async fn handle(&self, command: ResumeJob) -> Result<ResumeJobResponse, ApplicationError> {
        let previous = self
            .job_repo
            .find_by_id(&command.job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", &command.job_id))?;

        if previous.status != JobStatus::Paused {
            return Err(ApplicationError::invalid_state(format!(
                "only paused jobs can be resumed, job {} is {}",
                previous.job_id,
                previous.status.as_str()
            )));
        }

        let mut config = previous.config.clone();
        config.resume_from = previous.completed_stage;
        let job = JobRecord::new(previous.project_id.clone(), config);

        self.job_repo.create(&job).await?;
        self.job_repo
            .append_log(&previous.job_id, &format!("Resumed as job {}", job.job_id))
            .await?;
        self.job_repo
            .append_log(&job.job_id, &format!("Resuming from job {}", previous.job_id))
            .await?;
        self.job_queue.push(&job.job_id)?;

        tracing::info!(
            previous_job_id = %previous.job_id,
            job_id = %job.job_id,
            resume_from = ?job.config.resume_from,
            "Job resumed"
        );

        Ok(ResumeJobResponse {
            previous_job_id: previous.job_id,
            job_id: job.job_id,
            resume_from: job.config.resume_from,
        })
    }
}

// ============================================================================
// DeleteJob
// ============================================================================

/// DeleteJob Handler
pub struct DeleteJobHandler {
    job_repo: Arc<dyn JobRepositoryPort>,
    job_queue: Arc<dyn JobQueuePort>,
}

impl DeleteJobHandler {
    pub fn new(job_repo: Arc<dyn JobRepositoryPort>, job_queue: Arc<dyn JobQueuePort>) -> Self {
        Self { job_repo, job_queue }
    }

    pub async fn handle(&self, command: DeleteJob) -> Result<(), ApplicationError> {
        let job = self
            .job_repo
            .find_by_id(&command.job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", &command.job_id))?;

        if job.status == JobStatus::Running || self.job_queue.is_active(&job.job_id) {
            return Err(ApplicationError::invalid_state(format!(
                "job {} is running, cancel it first",
                job.job_id
            )));
        }

        self.job_repo.delete(&job.job_id).await?;
        self.job_queue.clear(&job.job_id);

        tracing::info!(job_id = %job.job_id, "Job deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::Concept;

    fn config() -> JobConfig {
        JobConfig {
            concept: Concept {
                title: "Tidebound".to_string(),
                premise: "A drowned empire rises.".to_string(),
                genre: "Fantasy".to_string(),
            },
            book_count: 2,
            chapters_per_book: 3,
            target_word_count: 30000,
            scenes_per_chapter: 3,
            preset: "balanced".to_string(),
            use_lore: true,
            resume_from: None,
        }
    }

    #[test]
    fn test_validate_project_id() {
        assert!(validate_project_id("tide-bound_01").is_ok());
        assert!(validate_project_id("").is_err());
        assert!(validate_project_id("../etc").is_err());
        assert!(validate_project_id("a b").is_err());
    }

    #[test]
    fn test_validate_config() {
        assert!(validate_job_config(&config()).is_ok());

        let mut bad = config();
        bad.book_count = 0;
        assert!(validate_job_config(&bad).is_err());

        let mut bad = config();
        bad.preset = "turbo".to_string();
        let err = validate_job_config(&bad).unwrap_err();
        assert!(err.to_string().contains("turbo"));

        let mut bad = config();
        bad.concept.title = "  ".to_string();
        assert!(validate_job_config(&bad).is_err());
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("pause"), "Pause");
        assert_eq!(capitalize(""), "");
    }
}
