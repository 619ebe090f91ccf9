//! 六个生成阶段
//!
//! 每个阶段模块提供：
//! - `contract`: 结构契约
//! - `parse`: 模型输出 → 强类型候选
//! - `context`: 上下文文本
//! - `apply`: 写回内容树

pub mod beat;
pub mod book;
pub mod chapter;
pub mod prompts;
pub mod prose;
pub mod scene;
pub mod series;
