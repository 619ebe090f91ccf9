//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（ModelPort、LoreStorePort、CheckpointPort、JobRepositoryPort 等）
//! - extraction / coerce: 模型输出 → JSON → 强类型记录
//! - contract: 阶段契约、重试控制与自动修正
//! - stages / gate / pipeline: 六阶段生成、质量关卡与编排
//! - commands / queries: 任务控制的 CQRS 命令与查询
//! - error: 应用层错误定义

pub mod coerce;
pub mod commands;
pub mod contract;
pub mod error;
pub mod extraction;
pub mod gate;
pub mod generator;
pub mod model_config;
pub mod pipeline;
pub mod ports;
pub mod queries;
pub mod stages;

// Re-exports
pub use commands::{
    handlers::{
        CancelJobHandler, ControlJobResponse, DeleteJobHandler, EnqueueJobHandler,
        EnqueueJobResponse, PauseJobHandler, ResumeJobHandler, ResumeJobResponse,
        validate_job_config, validate_project_id,
    },
    CancelJob, DeleteJob, EnqueueJob, PauseJob, ResumeJob,
};

pub use error::{ApplicationError, PipelineError};

pub use contract::{Contract, ContractViolation, RetryController};
pub use extraction::{extract, ExtractionError};
pub use gate::{QualityGate, QualityGateHalt};
pub use generator::{ApiRetryPolicy, Generator};
pub use model_config::{Preset, StageModelMap};
pub use pipeline::{GateSettings, NoopHooks, Pipeline, PipelineHooks, PipelineSettings};

pub use ports::{
    ApiError, CheckpointError, CheckpointPort, Concept, JobConfig, JobQueuePort, JobRecord,
    JobRepositoryPort, JobStatus, LoreStorePort, ModelPort, RepositoryError,
};

pub use queries::{
    handlers::{
        GetJobLogsHandler, GetJobStatusHandler, JobLogResponse, JobResponse, ListJobsHandler,
    },
    GetJobLogs, GetJobStatus, ListJobs,
};
