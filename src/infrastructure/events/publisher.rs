//! Event Publisher Implementation
//!
//! 任务状态与阶段进度的广播，WebSocket 订阅后推送给客户端

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::ports::JobStatus;
use crate::domain::content::Stage;

/// 任务事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum JobEvent {
    /// 任务状态变更
    JobStatusChanged {
        job_id: String,
        project_id: String,
        status: JobStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// 阶段开始
    StageStarted {
        job_id: String,
        stage: Stage,
        progress_percent: u8,
    },
    /// 单元提交（一本书、一章、一个场景……）
    UnitCommitted {
        job_id: String,
        stage: Stage,
        unit: String,
    },
    /// 阶段完成
    StageCompleted {
        job_id: String,
        stage: Stage,
        progress_percent: u8,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::JobStatusChanged { job_id, .. }
            | JobEvent::StageStarted { job_id, .. }
            | JobEvent::UnitCommitted { job_id, .. }
            | JobEvent::StageCompleted { job_id, .. } => job_id,
        }
    }
}

/// 事件发布器
pub struct EventPublisher {
    channel: broadcast::Sender<JobEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { channel: tx }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅全部任务事件
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.channel.subscribe()
    }

    /// 发布任务状态变更
    pub fn publish_status(
        &self,
        job_id: &str,
        project_id: &str,
        status: JobStatus,
        error: Option<&str>,
    ) {
        self.publish(JobEvent::JobStatusChanged {
            job_id: job_id.to_string(),
            project_id: project_id.to_string(),
            status,
            error: error.map(str::to_string),
        });
    }

    pub fn publish_stage_started(&self, job_id: &str, stage: Stage) {
        self.publish(JobEvent::StageStarted {
            job_id: job_id.to_string(),
            stage,
            progress_percent: progress_before(stage),
        });
    }

    pub fn publish_unit_committed(&self, job_id: &str, stage: Stage, unit: &str) {
        self.publish(JobEvent::UnitCommitted {
            job_id: job_id.to_string(),
            stage,
            unit: unit.to_string(),
        });
    }

    pub fn publish_stage_completed(&self, job_id: &str, stage: Stage) {
        self.publish(JobEvent::StageCompleted {
            job_id: job_id.to_string(),
            stage,
            progress_percent: stage.progress_percent(),
        });
    }

    fn publish(&self, event: JobEvent) {
        if let Err(e) = self.channel.send(event) {
            tracing::debug!(
                job_id = %e.0.job_id(),
                "Failed to publish event (no receivers)"
            );
        }
    }
}

/// 阶段开始时的进度（上一阶段完成的百分比）
pub(crate) fn progress_before(stage: Stage) -> u8 {
    match stage.index() {
        0 => 0,
        i => Stage::ALL[i - 1].progress_percent(),
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
