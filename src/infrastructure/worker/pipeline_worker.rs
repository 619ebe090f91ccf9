//! Pipeline Worker - Background Job Processor
//!
//! 单 worker 顺序消费 FIFO 队列；暂停 / 取消只在阶段与单元边界生效。
//! Worker 关闭时运行中的任务在下一个边界转为 paused，可从最近的检查点恢复。

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::error::PipelineError;
use crate::application::pipeline::PipelineHooks;
use crate::application::ports::{
    ControlRequest, JobFilter, JobQueuePort, JobRecord, JobRepositoryPort, JobStatus, JobUpdate,
};
use crate::domain::content::Stage;
use crate::infrastructure::events::EventPublisher;

use super::factory::PipelineFactory;

/// Worker 配置
#[derive(Debug, Clone)]
pub struct PipelineWorkerConfig {
    /// 队列轮询超时
    pub poll_timeout: Duration,
}

impl Default for PipelineWorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(1000),
        }
    }
}

/// 流水线 Worker
pub struct PipelineWorker {
    config: PipelineWorkerConfig,
    queue_receiver: mpsc::Receiver<String>,
    job_repo: Arc<dyn JobRepositoryPort>,
    job_queue: Arc<dyn JobQueuePort>,
    factory: Arc<PipelineFactory>,
    event_publisher: Arc<EventPublisher>,
}

impl PipelineWorker {
    pub fn new(
        config: PipelineWorkerConfig,
        queue_receiver: mpsc::Receiver<String>,
        job_repo: Arc<dyn JobRepositoryPort>,
        job_queue: Arc<dyn JobQueuePort>,
        factory: Arc<PipelineFactory>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            config,
            queue_receiver,
            job_repo,
            job_queue,
            factory,
            event_publisher,
        }
    }

    /// 启动 Worker，直到 `shutdown` 被取消或队列关闭
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(
            poll_timeout_ms = self.config.poll_timeout.as_millis() as u64,
            "PipelineWorker started"
        );
        self.recover_interrupted().await;

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = tokio::time::timeout(self.config.poll_timeout, self.queue_receiver.recv()) => received,
            };
            match received {
                // 超时：回到循环检查 shutdown
                Err(_) => continue,
                Ok(None) => break,
                Ok(Some(job_id)) => {
                    self.process_job(&job_id, &shutdown).await;
                    self.job_queue.clear(&job_id);
                }
            }
        }

        tracing::info!("PipelineWorker stopped");
    }

    /// 上次进程被杀时仍为 running 的任务转为 paused，使其可以恢复
    async fn recover_interrupted(&self) {
        let filter = JobFilter {
            status: Some(JobStatus::Running),
            ..Default::default()
        };
        let jobs = match self.job_repo.list(&filter).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list interrupted jobs");
                return;
            }
        };
        for job in jobs {
            tracing::warn!(job_id = %job.job_id, completed_stage = ?job.completed_stage, "Recovering interrupted job");
            self.set_status(&job, JobUpdate::status(JobStatus::Paused)).await;
            self.log(&job.job_id, "Job interrupted by worker restart, marked paused")
                .await;
        }
    }

    async fn log(&self, job_id: &str, line: &str) {
        if let Err(e) = self.job_repo.append_log(job_id, line).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to append job log");
        }
    }

    async fn set_status(&self, job: &JobRecord, update: JobUpdate) {
        let Some(status) = update.status else {
            return;
        };
        if let Err(e) = self.job_repo.update(&job.job_id, &update).await {
            tracing::error!(job_id = %job.job_id, error = %e, "Failed to update job status");
        }
        tracing::info!(job_id = %job.job_id, status = status.as_str(), "Job status changed");
        self.event_publisher.publish_status(
            &job.job_id,
            &job.project_id,
            status,
            update.error_message.as_deref(),
        );
    }

    /// 处理单个任务
    async fn process_job(&self, job_id: &str, shutdown: &CancellationToken) {
        let job = match self.job_repo.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id = %job_id, "Job not found, skipping");
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to load job");
                return;
            }
        };

        // 排队期间已被暂停或取消
        if job.status != JobStatus::Queued {
            tracing::info!(job_id = %job_id, status = job.status.as_str(), "Skipping job that is no longer queued");
            return;
        }
        match self.job_queue.pending_request(job_id) {
            Some(ControlRequest::Cancel) => {
                self.set_status(&job, JobUpdate::status(JobStatus::Cancelled)).await;
                self.log(job_id, "Job cancelled before start").await;
                return;
            }
            Some(ControlRequest::Pause) => {
                self.set_status(&job, JobUpdate::status(JobStatus::Paused)).await;
                self.log(job_id, "Job paused before start").await;
                return;
            }
            None => {}
        }

        self.job_queue.mark_active(job_id);
        self.set_status(&job, JobUpdate::status(JobStatus::Running)).await;
        match job.config.resume_from {
            Some(stage) => {
                self.log(job_id, &format!("Job started, resuming after {} stage", stage))
                    .await
            }
            None => self.log(job_id, "Job started").await,
        }

        let update = match self.execute(&job, shutdown).await {
            Ok(()) => {
                self.log(job_id, "Job completed").await;
                JobUpdate {
                    status: Some(JobStatus::Completed),
                    progress_percent: Some(100),
                    ..Default::default()
                }
            }
            Err(PipelineError::Paused(stage)) => {
                let line = if shutdown.is_cancelled() {
                    format!("Job paused before {} stage (worker shutdown)", stage)
                } else {
                    format!("Job paused before {} stage", stage)
                };
                self.log(job_id, &line).await;
                JobUpdate::status(JobStatus::Paused)
            }
            Err(PipelineError::Cancelled(stage)) => {
                self.log(job_id, &format!("Job cancelled before {} stage", stage)).await;
                JobUpdate::status(JobStatus::Cancelled)
            }
            Err(e) => {
                self.log(job_id, &format!("Job failed: {}", e)).await;
                JobUpdate::status(JobStatus::Failed).with_error(e.to_string())
            }
        };
        self.set_status(&job, update).await;
    }

    /// 组装并运行流水线；致命错误写入错误报告
    async fn execute(
        &self,
        job: &JobRecord,
        shutdown: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let pipeline = self.factory.build(&job.config)?;
        let resume_from = job.config.resume_from;
        let mut project = pipeline
            .prepare(&job.project_id, &job.config.concept, resume_from)
            .await?;

        let hooks = WorkerHooks {
            job_id: job.job_id.clone(),
            job_repo: self.job_repo.clone(),
            job_queue: self.job_queue.clone(),
            event_publisher: self.event_publisher.clone(),
            shutdown: shutdown.clone(),
        };

        match pipeline.run(&mut project, resume_from, &hooks).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_interruption() => Err(e),
            Err(e) => {
                if let Some(path) = pipeline.write_error_report(&project, &e).await {
                    self.log(&job.job_id, &format!("Error report written to {}", path.display()))
                        .await;
                }
                Err(e)
            }
        }
    }
}

/// 边界检查与进度回写
struct WorkerHooks {
    job_id: String,
    job_repo: Arc<dyn JobRepositoryPort>,
    job_queue: Arc<dyn JobQueuePort>,
    event_publisher: Arc<EventPublisher>,
    shutdown: CancellationToken,
}

impl WorkerHooks {
    async fn log(&self, line: &str) {
        if let Err(e) = self.job_repo.append_log(&self.job_id, line).await {
            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to append job log");
        }
    }

    async fn update(&self, update: JobUpdate) {
        if let Err(e) = self.job_repo.update(&self.job_id, &update).await {
            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to update job progress");
        }
    }
}

#[async_trait]
impl PipelineHooks for WorkerHooks {
    /// 显式的取消 / 暂停请求优先；其次是 worker 关闭
    async fn boundary(&self, stage: Stage) -> Result<(), PipelineError> {
        match self.job_queue.pending_request(&self.job_id) {
            Some(ControlRequest::Cancel) => Err(PipelineError::Cancelled(stage)),
            Some(ControlRequest::Pause) => Err(PipelineError::Paused(stage)),
            None if self.shutdown.is_cancelled() => {
                tracing::info!(job_id = %self.job_id, stage = %stage, "Worker shutting down, pausing job");
                Err(PipelineError::Paused(stage))
            }
            None => Ok(()),
        }
    }

    async fn on_stage_started(&self, stage: Stage) {
        self.update(JobUpdate {
            current_stage: Some(stage),
            progress_percent: Some(crate::infrastructure::events::progress_before(stage)),
            ..Default::default()
        })
        .await;
        self.log(&format!("Stage {} started", stage)).await;
        self.event_publisher.publish_stage_started(&self.job_id, stage);
    }

    async fn on_unit_committed(&self, stage: Stage, unit: &str, _path: &Path) {
        self.log(&format!("Committed {}", unit)).await;
        self.event_publisher
            .publish_unit_committed(&self.job_id, stage, unit);
    }

    async fn on_stage_complete(&self, stage: Stage, path: &Path) {
        self.update(JobUpdate {
            completed_stage: Some(stage),
            progress_percent: Some(stage.progress_percent()),
            ..Default::default()
        })
        .await;
        self.log(&format!(
            "Stage {} complete, checkpoint {}",
            stage,
            path.display()
        ))
        .await;
        self.event_publisher.publish_stage_completed(&self.job_id, stage);
    }
}
