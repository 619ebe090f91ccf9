//! Model Adapter - 生成模型客户端实现

mod http_model_client;
mod scripted_model;

pub use http_model_client::*;
pub use scripted_model::{RecordedCall, ScriptedModelClient, ScriptedResponder};
