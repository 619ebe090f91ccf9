//! Worker Layer - Background Job Processing
//!
//! 实现 PipelineWorker，顺序执行排队的生成任务

mod factory;
mod pipeline_worker;

pub use factory::PipelineFactory;
pub use pipeline_worker::{PipelineWorker, PipelineWorkerConfig};
