//! Model Port - 生成模型抽象
//!
//! 只约定 prompt 输入、文本输出；具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::content::Stage;

/// 模型调用错误（传输层 / 服务商层面，与文本结构问题无关）
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Malformed API envelope: {0}")]
    MalformedEnvelope(String),
}

impl ApiError {
    /// 是否值得退避重试
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout | ApiError::MalformedEnvelope(_) => true,
            ApiError::Provider { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// 调用角色：六个生成阶段 + 两个评审者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    Series,
    Book,
    Chapter,
    Scene,
    Beat,
    Prose,
    Qa,
    Lore,
}

impl ModelRole {
    pub const ALL: [ModelRole; 8] = [
        ModelRole::Series,
        ModelRole::Book,
        ModelRole::Chapter,
        ModelRole::Scene,
        ModelRole::Beat,
        ModelRole::Prose,
        ModelRole::Qa,
        ModelRole::Lore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Series => "series",
            ModelRole::Book => "book",
            ModelRole::Chapter => "chapter",
            ModelRole::Scene => "scene",
            ModelRole::Beat => "beat",
            ModelRole::Prose => "prose",
            ModelRole::Qa => "qa",
            ModelRole::Lore => "lore",
        }
    }
}

impl From<Stage> for ModelRole {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Series => ModelRole::Series,
            Stage::Book => ModelRole::Book,
            Stage::Chapter => ModelRole::Chapter,
            Stage::Scene => ModelRole::Scene,
            Stage::Beat => ModelRole::Beat,
            Stage::Prose => ModelRole::Prose,
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次调用参数
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOptions {
    /// 调用角色（用于日志与路由）
    pub role: ModelRole,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub seed: Option<u64>,
}

/// Model Port
///
/// 不可信的文本生成服务
#[async_trait]
pub trait ModelPort: Send + Sync {
    /// 发送 prompt，返回原始文本
    async fn invoke(&self, prompt: &str, options: &InvokeOptions) -> Result<String, ApiError>;

    /// 检查服务是否可用
    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ApiError::Timeout.is_retryable());
        assert!(ApiError::MalformedEnvelope("Expecting value".into()).is_retryable());
        assert!(ApiError::Provider { status: 503, message: String::new() }.is_retryable());
        assert!(ApiError::Provider { status: 429, message: String::new() }.is_retryable());
        assert!(!ApiError::Provider { status: 401, message: String::new() }.is_retryable());
    }

    #[test]
    fn test_role_from_stage() {
        assert_eq!(ModelRole::from(Stage::Prose), ModelRole::Prose);
        assert_eq!(ModelRole::from(Stage::Series).as_str(), "series");
    }
}
