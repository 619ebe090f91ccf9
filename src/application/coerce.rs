//! Field Coercion
//!
//! 模型输出先解析为 `serde_json::Value`，再逐字段转换为强类型记录。
//! 转换过程不会在第一个错误处停止，而是收集全部 `CoercionError`，
//! 由调用方作为契约违规反馈给模型。
//!
//! 宽松规则：
//! - 整数接受数字字符串（允许百分号后缀）
//! - 字符串列表接受单个字符串
//! - `null` 视为缺失

use serde::Serialize;
use serde_json::{Map, Value};
use std::cell::RefCell;
use thiserror::Error;

/// 字段转换错误
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{path}: {message}")]
pub struct CoercionError {
    pub path: String,
    pub message: String,
}

/// 错误收集器
#[derive(Debug, Default)]
pub struct Coercer {
    errors: RefCell<Vec<CoercionError>>,
}

impl Coercer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以对象方式读取 `value`；不是对象时记录错误
    pub fn object<'a>(&'a self, path: &str, value: &'a Value) -> Option<Fields<'a>> {
        match value {
            Value::Object(map) => Some(Fields {
                coercer: self,
                path: path.to_string(),
                map,
            }),
            _ => {
                self.push(path, "expected object");
                None
            }
        }
    }

    /// 记录一条错误
    pub fn push(&self, path: &str, message: impl Into<String>) {
        self.errors.borrow_mut().push(CoercionError {
            path: if path.is_empty() {
                "$".to_string()
            } else {
                path.to_string()
            },
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.borrow().is_empty()
    }

    pub fn into_errors(self) -> Vec<CoercionError> {
        self.errors.into_inner()
    }

    /// 结束转换：无错误时返回值，否则返回全部错误
    pub fn finish<T>(self, value: T) -> Result<T, Vec<CoercionError>> {
        let errors = self.errors.into_inner();
        if errors.is_empty() {
            Ok(value)
        } else {
            Err(errors)
        }
    }
}

/// 对象字段游标
pub struct Fields<'a> {
    coercer: &'a Coercer,
    path: String,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub fn path(&self) -> &str {
        &self.path
    }

    fn key_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    fn error(&self, key: &str, message: impl Into<String>) {
        self.coercer.push(&self.key_path(key), message);
    }

    /// 原始值（`null` 视为缺失）
    pub fn raw(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    pub fn has(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// 必填字符串
    pub fn string(&self, key: &str) -> String {
        match self.raw(key) {
            None => {
                self.error(key, "missing required field");
                String::new()
            }
            Some(value) => self.to_string_value(key, value).unwrap_or_default(),
        }
    }

    /// 可选字符串，缺失时取默认值
    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.opt_string(key).unwrap_or_else(|| default.to_string())
    }

    pub fn opt_string(&self, key: &str) -> Option<String> {
        self.raw(key).and_then(|v| self.to_string_value(key, v))
    }

    fn to_string_value(&self, key: &str, value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => {
                self.error(key, "expected string");
                None
            }
        }
    }

    /// 必填非负整数
    pub fn req_uint(&self, key: &str) -> Option<u32> {
        match self.raw(key) {
            None => {
                self.error(key, "missing required field");
                None
            }
            Some(value) => self.to_uint(key, value),
        }
    }

    /// 可选非负整数
    pub fn uint_or(&self, key: &str, default: u32) -> u32 {
        self.raw(key)
            .and_then(|v| self.to_uint(key, v))
            .unwrap_or(default)
    }

    fn to_uint(&self, key: &str, value: &Value) -> Option<u32> {
        let parsed = match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
            Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<u64>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) => Some(n.min(u32::MAX as u64) as u32),
            None => {
                self.error(key, "expected non-negative integer");
                None
            }
        }
    }

    /// 字符串列表（可选）；单个字符串视为一元列表
    pub fn strings(&self, key: &str) -> Vec<String> {
        match self.raw(key) {
            None => Vec::new(),
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    match item {
                        Value::String(s) => out.push(s.clone()),
                        Value::Number(n) => out.push(n.to_string()),
                        // 对象元素取 name / description 字段
                        Value::Object(map) => match map
                            .get("description")
                            .or_else(|| map.get("name"))
                            .and_then(Value::as_str)
                        {
                            Some(s) => out.push(s.to_string()),
                            None => self
                                .coercer
                                .push(&format!("{}[{}]", self.key_path(key), index), "expected string"),
                        },
                        _ => self
                            .coercer
                            .push(&format!("{}[{}]", self.key_path(key), index), "expected string"),
                    }
                }
                out
            }
            Some(_) => {
                self.error(key, "expected array of strings");
                Vec::new()
            }
        }
    }

    /// 对象数组（可选，缺失时为空）
    pub fn items(&self, key: &str) -> Vec<Fields<'a>> {
        match self.raw(key) {
            None => Vec::new(),
            Some(value) => self.to_items(key, value),
        }
    }

    /// 对象数组（必填）
    pub fn req_items(&self, key: &str) -> Vec<Fields<'a>> {
        match self.raw(key) {
            None => {
                self.error(key, "missing required field");
                Vec::new()
            }
            Some(value) => self.to_items(key, value),
        }
    }

    fn to_items(&self, key: &str, value: &'a Value) -> Vec<Fields<'a>> {
        let Value::Array(items) = value else {
            self.error(key, "expected array of objects");
            return Vec::new();
        };
        let base = self.key_path(key);
        items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| self.coercer.object(&format!("{}[{}]", base, index), item))
            .collect()
    }

    /// 可选嵌套对象
    pub fn child(&self, key: &str) -> Option<Fields<'a>> {
        let value = self.raw(key)?;
        self.coercer.object(&self.key_path(key), value)
    }

    /// 对象原样保留（用于自由结构字段）
    pub fn object_map(&self, key: &str) -> Map<String, Value> {
        match self.raw(key) {
            None => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                self.error(key, "expected object");
                Map::new()
            }
        }
    }

    /// 数组原样保留
    pub fn values(&self, key: &str) -> Vec<Value> {
        match self.raw(key) {
            None => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
        }
    }

    /// 对象内的全部键值
    pub fn entries(&self) -> impl Iterator<Item = (&'a String, &'a Value)> {
        self.map.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collects_all_errors() {
        let value = json!({
            "chapters": [
                {"chapter_number": "1", "title": "Arrival", "plot_points": "The ship docks"},
                {"chapter_number": 2, "plot_points": [1, {"x": true}]},
                "not an object"
            ]
        });
        let coercer = Coercer::new();
        let root = coercer.object("", &value).unwrap();
        let chapters = root.req_items("chapters");
        assert_eq!(chapters.len(), 2);

        assert_eq!(chapters[0].req_uint("chapter_number"), Some(1));
        assert_eq!(chapters[0].strings("plot_points"), vec!["The ship docks"]);
        chapters[1].string("title");
        chapters[1].strings("plot_points");

        let errors = coercer.finish(()).unwrap_err();
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["chapters[2]", "chapters[1].title", "chapters[1].plot_points[1]"]
        );
        assert_eq!(errors[1].message, "missing required field");
    }

    #[test]
    fn test_defaults_and_null_as_missing() {
        let value = json!({"pov": null, "planned_word_count": 1200.0});
        let coercer = Coercer::new();
        let root = coercer.object("scene", &value).unwrap();
        assert_eq!(root.string_or("pov", "Unknown"), "Unknown");
        assert_eq!(root.uint_or("planned_word_count", 0), 1200);
        assert_eq!(root.uint_or("missing", 7), 7);
        assert!(coercer.finish(()).is_ok());
    }

    #[test]
    fn test_negative_number_rejected() {
        let value = json!({"word_count": -5});
        let coercer = Coercer::new();
        let root = coercer.object("", &value).unwrap();
        assert_eq!(root.uint_or("word_count", 0), 0);
        let errors = coercer.finish(()).unwrap_err();
        assert_eq!(errors[0].to_string(), "word_count: expected non-negative integer");
    }

    #[test]
    fn test_root_not_object() {
        let value = json!([1, 2]);
        let coercer = Coercer::new();
        assert!(coercer.object("", &value).is_none());
        assert_eq!(coercer.finish(()).unwrap_err()[0].path, "$");
    }
}
