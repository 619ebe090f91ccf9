//! Persistence Layer - 数据持久化
//!
//! SQLite 任务存储

pub mod sqlite;
