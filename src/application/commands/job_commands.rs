//! Job Commands

use crate::application::ports::JobConfig;

/// 任务入队命令
#[derive(Debug, Clone)]
pub struct EnqueueJob {
    pub project_id: String,
    pub config: JobConfig,
}

/// 暂停任务命令（在下一个阶段边界生效）
#[derive(Debug, Clone)]
pub struct PauseJob {
    pub job_id: String,
}

/// 取消任务命令
#[derive(Debug, Clone)]
pub struct CancelJob {
    pub job_id: String,
}

/// 恢复已暂停任务命令
#[derive(Debug, Clone)]
pub struct ResumeJob {
    pub job_id: String,
}

/// 删除任务命令
#[derive(Debug, Clone)]
pub struct DeleteJob {
    pub job_id: String,
}
