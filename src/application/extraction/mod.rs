//! Structured Response Extractor
//!
//! 从模型的自由文本中提取 JSON 对象。模型输出经常包裹在 markdown
//! 代码块或解释性文字中，也可能被截断或带有尾逗号。
//!
//! 提取顺序：
//! 1. ```` ```json ```` 代码块，其次任意代码块，否则原文
//! 2. 直接解析
//! 3. 收窄到第一个 `{` 至最后一个 `}` 再解析
//! 4. 从第一个 `{` 开始做容错修复后再解析
//!
//! 纯函数，无副作用。

mod repair;

use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub use repair::repair_json;

/// 错误样本的最大字符数
const RAW_SAMPLE_CHARS: usize = 500;

/// 提取失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorKind {
    /// 空响应
    Empty,
    /// 响应中没有任何 JSON 对象起始符
    NoObject,
    /// 有疑似 JSON 但修复后仍无法解析
    Malformed,
}

impl fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionErrorKind::Empty => "empty",
            ExtractionErrorKind::NoObject => "no_object",
            ExtractionErrorKind::Malformed => "malformed",
        };
        f.write_str(s)
    }
}

/// 提取错误
#[derive(Debug, Clone, Error)]
#[error("Could not extract JSON object ({kind}): {detail}")]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    pub detail: String,
    /// 原始响应的前 500 个字符
    pub raw_sample: String,
}

impl ExtractionError {
    fn new(kind: ExtractionErrorKind, detail: impl Into<String>, raw: &str) -> Self {
        Self {
            kind,
            detail: detail.into(),
            raw_sample: raw_sample(raw),
        }
    }
}

/// 截取原文样本（按字符边界）
pub fn raw_sample(raw: &str) -> String {
    raw.chars().take(RAW_SAMPLE_CHARS).collect()
}

/// 从模型响应中提取 JSON 对象
pub fn extract(raw: &str) -> Result<Value, ExtractionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ExtractionError::new(
            ExtractionErrorKind::Empty,
            "response is empty",
            raw,
        ));
    }

    let candidate = select_candidate(trimmed);

    // 1. 直接解析
    let direct_error = match parse_object(candidate) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    // 代码块里没有对象时退回到全文
    let source = if candidate.contains('{') { candidate } else { trimmed };
    let start = match source.find('{') {
        Some(start) => start,
        None => {
            return Err(ExtractionError::new(
                ExtractionErrorKind::NoObject,
                format!("no JSON object found ({})", direct_error),
                raw,
            ))
        }
    };

    // 2. 第一个 { 到最后一个 } 的跨度
    if let Some(end) = source.rfind('}') {
        if end > start {
            if let Ok(value) = parse_object(&source[start..=end]) {
                tracing::debug!("Extracted JSON object from wrapped response");
                return Ok(value);
            }
        }
    }

    // 3. 容错修复
    let repaired = repair_json(&source[start..]);
    match parse_object(&repaired) {
        Ok(value) => {
            tracing::debug!(
                original_len = source.len() - start,
                repaired_len = repaired.len(),
                "Extracted JSON object after repair"
            );
            Ok(value)
        }
        Err(e) => Err(ExtractionError::new(
            ExtractionErrorKind::Malformed,
            format!("repair failed: {}", e),
            raw,
        )),
    }
}

/// 选择候选文本：```json 代码块 > 任意代码块 > 原文
fn select_candidate(text: &str) -> &str {
    if let Some(block) = fenced_block(text, "```json") {
        return block;
    }
    if let Some(block) = fenced_block(text, "```") {
        return block;
    }
    text
}

/// 提取代码块内容；没有闭合围栏时（截断响应）取到文末
fn fenced_block<'a>(text: &'a str, fence: &str) -> Option<&'a str> {
    let start = text.find(fence)?;
    let mut content_start = start + fence.len();
    // 跳过语言标识所在行
    if let Some(newline) = text[content_start..].find('\n') {
        let header = &text[content_start..content_start + newline];
        if !header.contains('{') {
            content_start += newline + 1;
        }
    }
    let body = &text[content_start..];
    let block = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    let block = block.trim();
    if block.is_empty() {
        None
    } else {
        Some(block)
    }
}

fn parse_object(text: &str) -> Result<Value, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    if value.is_object() {
        Ok(value)
    } else {
        Err("top-level JSON value is not an object".to_string())
    }
}
