//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod checkpoint;
mod job_queue;
mod job_store;
mod lore_store;
mod model;

pub use checkpoint::{CheckpointError, CheckpointInfo, CheckpointPort};
pub use job_queue::{ControlRequest, JobQueuePort, QueueError};
pub use job_store::{
    Concept, JobConfig, JobFilter, JobLogEntry, JobRecord, JobRepositoryPort, JobStatus,
    JobUpdate, RepositoryError,
};
pub use lore_store::{format_lore_context, LoreEntry, LoreStoreError, LoreStorePort, LoreType};
pub use model::{ApiError, InvokeOptions, ModelPort, ModelRole};
