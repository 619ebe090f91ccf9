//! 应用层 - 命令（写操作）
//!
//! CQRS 命令侧：任务入队与控制

mod job_commands;

pub mod handlers;

pub use job_commands::*;
