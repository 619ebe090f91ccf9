//! In-Memory Job Queue Implementation

use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::application::ports::{ControlRequest, JobQueuePort, QueueError};

/// 内存任务队列
///
/// 入队即发送到 worker 持有的 mpsc 接收端，FIFO 由通道保证
pub struct InMemoryJobQueue {
    queue_sender: mpsc::Sender<String>,
    /// 正在被 worker 执行的任务
    active: DashSet<String>,
    /// job_id -> 待处理的控制请求
    requests: DashMap<String, ControlRequest>,
}

impl InMemoryJobQueue {
    pub fn new(queue_sender: mpsc::Sender<String>) -> Self {
        Self {
            queue_sender,
            active: DashSet::new(),
            requests: DashMap::new(),
        }
    }

    /// 创建队列与对应的接收端
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl JobQueuePort for InMemoryJobQueue {
    fn push(&self, job_id: &str) -> Result<(), QueueError> {
        self.queue_sender
            .try_send(job_id.to_string())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            })?;
        tracing::debug!(job_id = %job_id, "Job pushed to queue");
        Ok(())
    }

    fn mark_active(&self, job_id: &str) {
        self.active.insert(job_id.to_string());
    }

    fn is_active(&self, job_id: &str) -> bool {
        self.active.contains(job_id)
    }

    fn request(&self, job_id: &str, request: ControlRequest) {
        self.requests
            .entry(job_id.to_string())
            .and_modify(|existing| {
                // 取消不会被暂停覆盖
                if *existing != ControlRequest::Cancel {
                    *existing = request;
                }
            })
            .or_insert(request);
    }

    fn pending_request(&self, job_id: &str) -> Option<ControlRequest> {
        self.requests.get(job_id).map(|r| *r)
    }

    fn clear(&self, job_id: &str) {
        self.active.remove(job_id);
        self.requests.remove(job_id);
    }
}
