//! 任务控制：SQLite 任务表 + 内存队列 + 后台 worker

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use common::{job_config, responder, settings, Shape};
use fabula::application::ports::{
    ControlRequest, InvokeOptions, JobQueuePort, JobUpdate, ModelRole,
};
use fabula::application::{
    ApplicationError, CancelJob, CancelJobHandler, DeleteJob, DeleteJobHandler, EnqueueJob,
    EnqueueJobHandler, GetJobLogs, GetJobLogsHandler, GetJobStatus, GetJobStatusHandler,
    JobRepositoryPort, JobResponse, JobStatus, ListJobs, ListJobsHandler, PauseJob,
    PauseJobHandler, ResumeJob, ResumeJobHandler,
};
use fabula::domain::content::Stage;
use fabula::infrastructure::adapters::ScriptedModelClient;
use fabula::infrastructure::events::{EventPublisher, JobEvent};
use fabula::infrastructure::memory::InMemoryJobQueue;
use fabula::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteJobRepository,
};
use fabula::infrastructure::worker::{PipelineWorker, PipelineWorkerConfig};

struct Harness {
    dir: TempDir,
    repo: Arc<SqliteJobRepository>,
    queue: Arc<InMemoryJobQueue>,
    receiver: Option<tokio::sync::mpsc::Receiver<String>>,
    events: Arc<EventPublisher>,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let (queue, receiver) = InMemoryJobQueue::channel(16);
        Self {
            dir,
            repo: Arc::new(SqliteJobRepository::new(pool)),
            queue: queue.arc(),
            receiver: Some(receiver),
            events: EventPublisher::new().arc(),
        }
    }

    async fn enqueue(&self, shape: Shape) -> String {
        EnqueueJobHandler::new(self.repo.clone(), self.queue.clone())
            .handle(EnqueueJob {
                project_id: "tide".to_string(),
                config: job_config(shape),
            })
            .await
            .unwrap()
            .job_id
    }

    async fn status(&self, job_id: &str) -> Result<JobResponse, ApplicationError> {
        GetJobStatusHandler::new(self.repo.clone())
            .handle(GetJobStatus {
                job_id: job_id.to_string(),
            })
            .await
    }

    async fn logs(&self, job_id: &str, limit: Option<u32>) -> Vec<String> {
        GetJobLogsHandler::new(self.repo.clone())
            .handle(GetJobLogs {
                job_id: job_id.to_string(),
                limit,
            })
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.line)
            .collect()
    }

    /// 启动 worker；`stop_after` 与重试参数作用于之后的每个任务
    async fn start(
        &mut self,
        model: Arc<ScriptedModelClient>,
        stop_after: Option<Stage>,
        gate_retries: u32,
    ) -> (CancellationToken, JoinHandle<()>) {
        self.start_with(model, stop_after, gate_retries, CancellationToken::new())
            .await
    }

    async fn start_with(
        &mut self,
        model: Arc<ScriptedModelClient>,
        stop_after: Option<Stage>,
        gate_retries: u32,
        shutdown: CancellationToken,
    ) -> (CancellationToken, JoinHandle<()>) {
        let factory =
            common::factory(model, self.dir.path(), settings(stop_after), 3, gate_retries).await;
        let worker = PipelineWorker::new(
            PipelineWorkerConfig {
                poll_timeout: Duration::from_millis(50),
            },
            self.receiver.take().unwrap(),
            self.repo.clone(),
            self.queue.clone(),
            Arc::new(factory),
            self.events.clone(),
        );
        let handle = tokio::spawn(worker.run(shutdown.clone()));
        (shutdown, handle)
    }

    async fn wait_for(&self, job_id: &str, status: JobStatus) -> JobResponse {
        for _ in 0..200 {
            let job = self.status(job_id).await.unwrap();
            if job.status == status.as_str() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {} never reached {}", job_id, status.as_str());
    }
}

/// 模型在 `role` 被调用时对指定任务发出控制请求
fn controlling_model(
    shape: Shape,
    queue: Arc<InMemoryJobQueue>,
    target: Arc<Mutex<String>>,
    role: ModelRole,
    request: ControlRequest,
) -> Arc<ScriptedModelClient> {
    let inner = responder(shape, 8);
    Arc::new(ScriptedModelClient::with_responder(
        move |prompt: &str, options: &InvokeOptions| {
            if options.role == role {
                let job_id = target.lock().unwrap().clone();
                queue.request(&job_id, request);
            }
            inner(prompt, options)
        },
    ))
}

#[tokio::test]
async fn test_job_runs_to_completion() {
    let mut h = Harness::new().await;
    let shape = Shape::new(1, 2);
    let mut events = h.events.subscribe();

    let job_id = h.enqueue(shape).await;
    assert_eq!(h.status(&job_id).await.unwrap().status, "queued");

    let (shutdown, handle) = h.start(common::scripted(shape, 8), Some(Stage::Book), 3).await;
    let job = h.wait_for(&job_id, JobStatus::Completed).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(job.completed_stage.as_deref(), Some("book"));
    assert_eq!(job.progress_percent, 100);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());

    let logs = h.logs(&job_id, None).await;
    assert_eq!(logs.first().map(String::as_str), Some("Job queued for project tide"));
    assert!(logs.iter().any(|l| l == "Committed book_1"));
    assert_eq!(logs.last().map(String::as_str), Some("Job completed"));

    let tail = h.logs(&job_id, Some(2)).await;
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[1], "Job completed");

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.iter().all(|e| e.job_id() == job_id));
    assert!(seen.iter().any(|e| matches!(
        e,
        JobEvent::UnitCommitted { unit, .. } if unit == "book_1"
    )));
    assert!(matches!(
        seen.last(),
        Some(JobEvent::JobStatusChanged { status: JobStatus::Completed, .. })
    ));
}

#[tokio::test]
async fn test_pause_takes_effect_at_boundary_and_resume_continues() {
    let mut h = Harness::new().await;
    let shape = Shape::new(1, 2);
    let target = Arc::new(Mutex::new(String::new()));
    let model = controlling_model(
        shape,
        h.queue.clone(),
        target.clone(),
        ModelRole::Book,
        ControlRequest::Pause,
    );

    let job_id = h.enqueue(shape).await;
    *target.lock().unwrap() = job_id.clone();
    let (shutdown, handle) = h.start(model.clone(), Some(Stage::Chapter), 3).await;

    // 当前书完成并提交后，在章节阶段开始前暂停
    let paused = h.wait_for(&job_id, JobStatus::Paused).await;
    assert_eq!(paused.completed_stage.as_deref(), Some("book"));
    assert_eq!(model.call_count(ModelRole::Chapter), 0);
    let logs = h.logs(&job_id, None).await;
    assert!(logs.iter().any(|l| l == "Job paused before chapter stage"));

    let resumed = ResumeJobHandler::new(h.repo.clone(), h.queue.clone())
        .handle(ResumeJob {
            job_id: job_id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(resumed.previous_job_id, job_id);
    assert_ne!(resumed.job_id, job_id);
    assert_eq!(resumed.resume_from, Some(Stage::Book));

    let done = h.wait_for(&resumed.job_id, JobStatus::Completed).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(done.completed_stage.as_deref(), Some("chapter"));
    assert_eq!(model.call_count(ModelRole::Series), 1);
    assert_eq!(model.call_count(ModelRole::Book), 1);
    assert_eq!(model.call_count(ModelRole::Chapter), 2);

    let old_logs = h.logs(&job_id, None).await;
    assert_eq!(
        old_logs.last(),
        Some(&format!("Resumed as job {}", resumed.job_id))
    );
    // 原任务保持暂停
    assert_eq!(h.status(&job_id).await.unwrap().status, "paused");
}

#[tokio::test]
async fn test_cancel_stops_between_units() {
    let mut h = Harness::new().await;
    let shape = Shape::new(1, 3);
    let target = Arc::new(Mutex::new(String::new()));
    let model = controlling_model(
        shape,
        h.queue.clone(),
        target.clone(),
        ModelRole::Chapter,
        ControlRequest::Cancel,
    );

    let job_id = h.enqueue(shape).await;
    *target.lock().unwrap() = job_id.clone();
    let (shutdown, handle) = h.start(model.clone(), None, 3).await;

    let cancelled = h.wait_for(&job_id, JobStatus::Cancelled).await;
    shutdown.cancel();
    handle.await.unwrap();

    // 第 1 章已生成并提交，第 2 章之前生效
    assert_eq!(model.call_count(ModelRole::Chapter), 1);
    assert_eq!(cancelled.completed_stage.as_deref(), Some("book"));
    let logs = h.logs(&job_id, None).await;
    assert!(logs.iter().any(|l| l == "Committed book_1_chapter_1"));
    assert!(logs.iter().any(|l| l == "Job cancelled before chapter stage"));

    let err = ResumeJobHandler::new(h.repo.clone(), h.queue.clone())
        .handle(ResumeJob { job_id })
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::InvalidState(_)));
}

#[tokio::test]
async fn test_worker_shutdown_pauses_running_job_for_resume() {
    let mut h = Harness::new().await;
    let shape = Shape::new(1, 2);
    let shutdown = CancellationToken::new();
    let inner = responder(shape, 8);
    let trigger = shutdown.clone();
    // 书大纲生成期间收到关闭信号
    let model = Arc::new(ScriptedModelClient::with_responder(
        move |prompt: &str, options: &InvokeOptions| {
            if options.role == ModelRole::Book {
                trigger.cancel();
            }
            inner(prompt, options)
        },
    ));

    let job_id = h.enqueue(shape).await;
    let (_, handle) = h
        .start_with(model.clone(), None, 3, shutdown.clone())
        .await;
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop after shutdown")
        .unwrap();

    let paused = h.status(&job_id).await.unwrap();
    assert_eq!(paused.status, "paused");
    assert_eq!(paused.completed_stage.as_deref(), Some("book"));
    assert_eq!(model.call_count(ModelRole::Chapter), 0);
    let logs = h.logs(&job_id, None).await;
    assert!(logs.iter().any(|l| l == "Committed book_1"));
    assert!(logs
        .iter()
        .any(|l| l == "Job paused before chapter stage (worker shutdown)"));

    let resumed = ResumeJobHandler::new(h.repo.clone(), h.queue.clone())
        .handle(ResumeJob {
            job_id: job_id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(resumed.resume_from, Some(Stage::Book));
}

#[tokio::test]
async fn test_jobs_left_running_are_recovered_as_paused() {
    let mut h = Harness::new().await;
    let shape = Shape::new(1, 2);
    let job_id = h.enqueue(shape).await;
    h.repo
        .update(
            &job_id,
            &JobUpdate {
                status: Some(JobStatus::Running),
                completed_stage: Some(Stage::Series),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    // 队列里的 id 属于被杀掉的旧进程
    h.receiver.as_mut().unwrap().try_recv().unwrap();

    let (shutdown, handle) = h.start(common::scripted(shape, 8), None, 3).await;
    let paused = h.wait_for(&job_id, JobStatus::Paused).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(paused.completed_stage.as_deref(), Some("series"));
    let logs = h.logs(&job_id, None).await;
    assert_eq!(
        logs.last().map(String::as_str),
        Some("Job interrupted by worker restart, marked paused")
    );

    let resumed = ResumeJobHandler::new(h.repo.clone(), h.queue.clone())
        .handle(ResumeJob { job_id })
        .await
        .unwrap();
    assert_eq!(resumed.resume_from, Some(Stage::Series));
}

#[tokio::test]
async fn test_gate_halt_fails_job_and_writes_report() {
    let mut h = Harness::new().await;
    let shape = Shape::new(1, 2);

    let job_id = h.enqueue(shape).await;
    let (shutdown, handle) = h.start(common::scripted(shape, 3), None, 0).await;
    let failed = h.wait_for(&job_id, JobStatus::Failed).await;
    shutdown.cancel();
    handle.await.unwrap();

    let message = failed.error_message.unwrap();
    assert!(message.contains("Quality gate halted"));
    assert!(failed.completed_stage.is_none());

    let reports: Vec<_> = std::fs::read_dir(h.dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("tide_error_"))
        .collect();
    assert_eq!(reports.len(), 1);

    let logs = h.logs(&job_id, None).await;
    assert!(logs.iter().any(|l| l.starts_with("Error report written to")));
    assert!(logs.iter().any(|l| l.starts_with("Job failed:")));
}

#[tokio::test]
async fn test_control_of_queued_jobs() {
    let h = Harness::new().await;
    let shape = Shape::new(1, 2);
    let first = h.enqueue(shape).await;
    let second = h.enqueue(shape).await;

    let paused = PauseJobHandler::new(h.repo.clone(), h.queue.clone())
        .handle(PauseJob {
            job_id: first.clone(),
        })
        .await
        .unwrap();
    assert_eq!(paused.status, JobStatus::Paused);
    assert!(!paused.deferred);

    let cancelled = CancelJobHandler::new(h.repo.clone(), h.queue.clone())
        .handle(CancelJob {
            job_id: second.clone(),
        })
        .await
        .unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    // 已暂停的任务不能再暂停或取消
    let err = CancelJobHandler::new(h.repo.clone(), h.queue.clone())
        .handle(CancelJob {
            job_id: first.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::InvalidState(_)));

    let err = PauseJobHandler::new(h.repo.clone(), h.queue.clone())
        .handle(PauseJob {
            job_id: "missing".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::NotFound { .. }));

    let listed = ListJobsHandler::new(h.repo.clone())
        .handle(ListJobs {
            status: Some(JobStatus::Paused),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].job_id, first);

    DeleteJobHandler::new(h.repo.clone(), h.queue.clone())
        .handle(DeleteJob {
            job_id: second.clone(),
        })
        .await
        .unwrap();
    assert!(matches!(
        h.status(&second).await,
        Err(ApplicationError::NotFound { .. })
    ));
    assert!(h.repo.find_by_id(&second).await.unwrap().is_none());
}

#[tokio::test]
async fn test_worker_skips_jobs_paused_while_queued() {
    let mut h = Harness::new().await;
    let shape = Shape::new(1, 2);
    let skipped = h.enqueue(shape).await;
    let runs = h.enqueue(shape).await;

    PauseJobHandler::new(h.repo.clone(), h.queue.clone())
        .handle(PauseJob {
            job_id: skipped.clone(),
        })
        .await
        .unwrap();

    let model = common::scripted(shape, 8);
    let (shutdown, handle) = h.start(model.clone(), Some(Stage::Series), 3).await;
    h.wait_for(&runs, JobStatus::Completed).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(h.status(&skipped).await.unwrap().status, "paused");
    assert_eq!(model.call_count(ModelRole::Series), 1);
}
