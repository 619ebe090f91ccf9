//! 应用层 - 查询（读操作）
//!
//! CQRS 查询侧：任务状态、日志与列表

mod job_queries;

pub mod handlers;

pub use job_queries::*;
