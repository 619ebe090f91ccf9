//! 应用层错误定义
//!
//! - `ApplicationError`: 任务控制命令/查询错误
//! - `PipelineError`: 流水线运行错误，致命时写入错误报告

use serde_json::{json, Value};
use thiserror::Error;

use crate::application::contract::ContractViolation;
use crate::application::gate::QualityGateHalt;
use crate::application::ports::{ApiError, CheckpointError, LoreStoreError, RepositoryError};
use crate::domain::content::Stage;

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 状态无效
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 仓储错误
    #[error("Repository error: {0}")]
    RepositoryError(String),

    /// 队列错误
    #[error("Queue error: {0}")]
    QueueError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// 创建状态无效错误
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => Self::not_found("Job", id),
            other => Self::RepositoryError(other.to_string()),
        }
    }
}

impl From<crate::application::ports::QueueError> for ApplicationError {
    fn from(err: crate::application::ports::QueueError) -> Self {
        Self::QueueError(err.to_string())
    }
}

/// 流水线错误
///
/// 提取错误与字段转换错误在阶段内部作为契约违规处理，
/// 重试耗尽后以 `Contract` 的形式出现在这里
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 模型调用在退避重试后仍失败
    #[error("Model API failed during {stage} stage: {source}")]
    Api {
        stage: Stage,
        #[source]
        source: ApiError,
    },

    #[error(transparent)]
    Contract(Box<ContractViolation>),

    #[error(transparent)]
    GateHalt(Box<QualityGateHalt>),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Lore store error: {0}")]
    Lore(#[from] LoreStoreError),

    /// 在阶段边界被取消
    #[error("Cancelled before {0} stage")]
    Cancelled(Stage),

    /// 在阶段边界被暂停
    #[error("Paused before {0} stage")]
    Paused(Stage),

    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Api { .. } => "api_error",
            PipelineError::Contract(_) => "contract_violation",
            PipelineError::GateHalt(_) => "quality_gate_halt",
            PipelineError::Checkpoint(_) => "checkpoint_error",
            PipelineError::Lore(_) => "lore_store_error",
            PipelineError::Cancelled(_) => "cancelled",
            PipelineError::Paused(_) => "paused",
            PipelineError::InvalidState(_) => "invalid_state",
        }
    }

    /// 暂停 / 取消是协作式中断，不是失败
    pub fn is_interruption(&self) -> bool {
        matches!(self, PipelineError::Cancelled(_) | PipelineError::Paused(_))
    }

    /// 结构化错误报告（写入错误文件与日志）
    pub fn report(&self) -> Value {
        let mut report = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        let details = match self {
            PipelineError::Api { stage, source } => json!({
                "stage": stage,
                "retryable": source.is_retryable(),
            }),
            PipelineError::Contract(v) => json!({
                "stage": v.stage,
                "unit": v.unit,
                "field": v.field,
                "expected": v.expected,
                "actual": v.actual,
                "attempts": v.attempts,
                "violations": v.violations,
                "raw_sample": v.raw_sample,
            }),
            PipelineError::GateHalt(halt) => json!({
                "scope": halt.scope,
                "attempts": halt.attempts,
                "qa_report": halt.qa,
                "consistency_report": halt.consistency,
            }),
            PipelineError::Cancelled(stage) | PipelineError::Paused(stage) => json!({
                "stage": stage,
            }),
            _ => Value::Null,
        };
        if let (Some(map), Value::Object(details)) = (report.as_object_mut(), details) {
            map.extend(details);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_not_found_maps_to_not_found() {
        let err: ApplicationError = RepositoryError::NotFound("job-1".to_string()).into();
        assert!(matches!(err, ApplicationError::NotFound { .. }));
        assert_eq!(err.to_string(), "Job not found: job-1");
    }

    #[test]
    fn test_pipeline_error_report() {
        let err = PipelineError::Api {
            stage: Stage::Book,
            source: ApiError::Timeout,
        };
        let report = err.report();
        assert_eq!(report["kind"], "api_error");
        assert_eq!(report["stage"], "book");
        assert_eq!(report["retryable"], true);
        assert!(!err.is_interruption());
        assert!(PipelineError::Paused(Stage::Scene).is_interruption());
    }
}
