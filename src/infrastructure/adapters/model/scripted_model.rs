//! Scripted Model Client - 回放预设响应的模型客户端
//!
//! 按调用角色排队的响应优先；队列为空时交给 responder 闭包；
//! 两者都没有时返回不可重试的 provider 错误。所有 prompt 都会被记录。

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::application::ports::{ApiError, InvokeOptions, ModelPort, ModelRole};

/// 动态响应闭包
pub type ScriptedResponder =
    Box<dyn Fn(&str, &InvokeOptions) -> Result<String, ApiError> + Send + Sync>;

/// 一次被记录的调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub role: ModelRole,
    pub prompt: String,
}

#[derive(Default)]
pub struct ScriptedModelClient {
    queues: Mutex<HashMap<ModelRole, VecDeque<Result<String, ApiError>>>>,
    responder: Option<ScriptedResponder>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str, &InvokeOptions) -> Result<String, ApiError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Default::default()
        }
    }

    /// 为角色追加一条文本响应
    pub fn push(&self, role: ModelRole, text: impl Into<String>) -> &Self {
        guard(&self.queues)
            .entry(role)
            .or_default()
            .push_back(Ok(text.into()));
        self
    }

    /// 为角色追加一次调用失败
    pub fn push_error(&self, role: ModelRole, error: ApiError) -> &Self {
        guard(&self.queues)
            .entry(role)
            .or_default()
            .push_back(Err(error));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        guard(&self.calls).clone()
    }

    /// 某个角色收到的全部 prompt
    pub fn prompts_for(&self, role: ModelRole) -> Vec<String> {
        guard(&self.calls)
            .iter()
            .filter(|call| call.role == role)
            .map(|call| call.prompt.clone())
            .collect()
    }

    pub fn call_count(&self, role: ModelRole) -> usize {
        guard(&self.calls)
            .iter()
            .filter(|call| call.role == role)
            .count()
    }
}

#[async_trait]
impl ModelPort for ScriptedModelClient {
    async fn invoke(&self, prompt: &str, options: &InvokeOptions) -> Result<String, ApiError> {
        guard(&self.calls).push(RecordedCall {
            role: options.role,
            prompt: prompt.to_string(),
        });

        let queued = guard(&self.queues)
            .get_mut(&options.role)
            .and_then(VecDeque::pop_front);
        if let Some(response) = queued {
            tracing::debug!(role = %options.role, "Scripted model: returning queued response");
            return response;
        }

        match &self.responder {
            Some(responder) => responder(prompt, options),
            None => Err(ApiError::Provider {
                status: 400,
                message: format!("no scripted response for role {}", options.role),
            }),
        }
    }
}
