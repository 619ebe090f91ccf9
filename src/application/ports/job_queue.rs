//! Job Queue Port - 任务队列与控制标志
//!
//! FIFO 队列 + 每个任务的暂停/取消请求标志，全部在内存中，
//! 具体实现在 infrastructure/memory 层

use thiserror::Error;

/// 队列错误
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job queue is full")]
    Full,

    #[error("Job queue is closed")]
    Closed,
}

/// 控制请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Pause,
    Cancel,
}

/// Job Queue Port
pub trait JobQueuePort: Send + Sync {
    /// 入队（FIFO）
    fn push(&self, job_id: &str) -> Result<(), QueueError>;

    /// 标记任务开始由 worker 执行
    fn mark_active(&self, job_id: &str);

    /// 任务是否正在执行
    fn is_active(&self, job_id: &str) -> bool;

    /// 请求暂停 / 取消（在下一个边界生效）
    fn request(&self, job_id: &str, request: ControlRequest);

    /// 读取待处理的控制请求（取消优先于暂停）
    fn pending_request(&self, job_id: &str) -> Option<ControlRequest>;

    /// 清理任务的活动标记与控制标志
    fn clear(&self, job_id: &str);
}
