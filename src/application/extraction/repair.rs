//! 容错修复
//!
//! 单次字符扫描，维护容器栈与字符串状态：
//! - 字符串内的裸换行、制表符转义
//! - 后面不是结构字符的引号视为内容，转义为 `\"`
//! - `}` / `]` 之前的尾逗号删除
//! - 输入截断时补齐字符串、悬空键值与未闭合容器
//!
//! 第一个完整对象闭合后停止扫描，丢弃其后的内容。

/// 修复疑似 JSON 文本（输入应从第一个 `{` 开始）
pub fn repair_json(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    // 期望的闭合符
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    // 当前字符串在 out 中的起始位置，以及它是否是对象键
    let mut string_start = 0usize;
    let mut string_is_key = false;
    // 已闭合但还没有 `:` 跟随的键
    let mut pending_key: Option<usize> = None;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                out.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => {
                    out.push(c);
                    escaped = true;
                }
                '"' => {
                    if closes_string(&chars[i + 1..]) {
                        out.push('"');
                        in_string = false;
                        if string_is_key {
                            pending_key = Some(string_start);
                        }
                    } else {
                        out.push_str("\\\"");
                    }
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => out.push(' '),
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                string_start = out.len();
                string_is_key = stack.last() == Some(&'}')
                    && matches!(last_significant(&out), Some('{') | Some(','));
                in_string = true;
                out.push(c);
            }
            '{' => {
                stack.push('}');
                out.push(c);
            }
            '[' => {
                stack.push(']');
                out.push(c);
            }
            '}' | ']' => {
                if !stack.contains(&c) {
                    continue;
                }
                while let Some(closer) = stack.pop() {
                    seal(&mut out, &mut pending_key);
                    out.push(closer);
                    if closer == c {
                        break;
                    }
                }
                if stack.is_empty() {
                    return out;
                }
            }
            ':' => {
                pending_key = None;
                out.push(c);
            }
            c => out.push(c),
        }
    }

    // 输入被截断
    if in_string {
        if string_is_key {
            out.truncate(string_start);
        } else {
            if escaped {
                out.pop();
            }
            out.push('"');
        }
    }
    while let Some(closer) = stack.pop() {
        seal(&mut out, &mut pending_key);
        out.push(closer);
    }
    out
}

/// 引号之后（跳过空白）是结构字符或文本结束时，才视为字符串结束
fn closes_string(rest: &[char]) -> bool {
    match rest.iter().find(|c| !c.is_whitespace()) {
        None => true,
        Some(c) => matches!(c, ',' | '}' | ']' | ':'),
    }
}

fn last_significant(out: &str) -> Option<char> {
    out.trim_end().chars().last()
}

/// 闭合容器前清理：悬空键、尾逗号、缺值的冒号
fn seal(out: &mut String, pending_key: &mut Option<usize>) {
    if let Some(start) = pending_key.take() {
        out.truncate(start);
    }
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    }
    if out.ends_with(':') {
        out.push_str("null");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn repaired(text: &str) -> Value {
        serde_json::from_str(&repair_json(text)).unwrap()
    }

    #[test]
    fn test_trailing_commas_removed() {
        assert_eq!(repaired(r#"{"a": [1, 2,], "b": 3,}"#), json!({"a": [1, 2], "b": 3}));
    }

    #[test]
    fn test_unterminated_structures_closed() {
        assert_eq!(repaired(r#"{"a": {"b": [1, 2"#), json!({"a": {"b": [1, 2]}}));
        assert_eq!(repaired(r#"{"title": "The Dro"#), json!({"title": "The Dro"}));
    }

    #[test]
    fn test_unescaped_quotes_inside_string() {
        let value = repaired(r#"{"text": "He said "run" now", "n": 1}"#);
        assert_eq!(value["text"], r#"He said "run" now"#);
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_raw_newlines_escaped() {
        let value = repaired("{\"text\": \"line one\nline two\ttab\"}");
        assert_eq!(value["text"], "line one\nline two\ttab");
    }

    #[test]
    fn test_dangling_key_dropped() {
        assert_eq!(repaired(r#"{"a": 1, "b"#), json!({"a": 1}));
        assert_eq!(repaired(r#"{"a": 1, "b""#), json!({"a": 1}));
    }

    #[test]
    fn test_dangling_colon_gets_null() {
        assert_eq!(repaired(r#"{"a": 1, "b":"#), json!({"a": 1, "b": null}));
    }

    #[test]
    fn test_stops_after_first_object() {
        assert_eq!(repaired(r#"{"a": 1} and then {"b": 2}"#), json!({"a": 1}));
    }

    #[test]
    fn test_stray_closer_skipped() {
        assert_eq!(repaired(r#"{"a": [1, 2]]}"#), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_valid_json_unchanged() {
        let text = r#"{"a": "x \"quoted\" y", "b": [true, null]}"#;
        assert_eq!(repair_json(text), text);
    }
}
