//! Fabula - 分阶段长篇小说生成系统
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Content Context: 内容树、设定与项目聚合
//! - Assessment Context: 质量审查与一致性报告
//!
//! 应用层 (application/):
//! - Ports: 端口定义（Model, LoreStore, Checkpoint, JobRepository, JobQueue）
//! - Pipeline: 六阶段生成、阶段契约、质量关卡
//! - Commands / Queries: 任务控制的 CQRS 处理器
//!
//! 基础设施层 (infrastructure/):
//! - Adapters: 模型客户端、设定库、检查点存储、书稿导出
//! - Persistence: SQLite 任务存储
//! - Memory: 任务队列与控制标志
//! - Worker: PipelineWorker 后台任务处理
//! - HTTP / Events: 任务控制 API 与 WebSocket 事件

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
