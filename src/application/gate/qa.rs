//! QA 评审结果解析
//!
//! 评审输出按宽松规则读取；空响应或无法提取 JSON 时降级为自动通过。

use std::collections::BTreeMap;

use serde_json::Value;

use crate::application::extraction::extract;
use crate::domain::assessment::{
    Approval, GateScope, Priority, QaReport, RevisionTask, QA_DIMENSIONS,
};

/// 降级通过的说明
pub const FALLBACK_NOTE: &str = "Automatic approval due to JSON parsing failure.";

pub fn parse_qa(scope: GateScope, raw: &str) -> QaReport {
    let value = match extract(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(scope = %scope, kind = %e.kind, "QA response unusable, falling back to automatic approval");
            return QaReport::fallback(scope, FALLBACK_NOTE);
        }
    };

    let mut scores = read_scores(&value);
    // 未给出总分时取各维度平均
    if !scores.contains_key("overall") && !scores.is_empty() {
        let sum: u32 = scores.values().map(|&s| s as u32).sum();
        let mean = (sum as f64 / scores.len() as f64).round() as u8;
        scores.insert("overall".to_string(), mean);
    }

    let mut revision_tasks: Vec<RevisionTask> = string_list(value.get("critical_issues"))
        .into_iter()
        .map(|description| RevisionTask {
            priority: Priority::Critical,
            description,
        })
        .collect();
    if let Some(Value::Array(tasks)) = value.get("revision_tasks") {
        revision_tasks.extend(tasks.iter().filter_map(revision_task));
    }

    QaReport::new(
        scope,
        scores,
        string_list(value.get("major_issues")),
        string_list(value.get("strengths")),
        revision_tasks,
        verdict(&value, Approval::NeedsRevision),
        value
            .get("reviewer_notes")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    )
}

/// 评审模型给出的结论；缺失或无法识别时取 `default`
pub(crate) fn verdict(value: &Value, default: Approval) -> Approval {
    match value.get("approval").and_then(Value::as_str) {
        Some(text) => Approval::from_loose(text).unwrap_or_else(|| {
            tracing::warn!(approval = text, default = default.as_str(), "Unrecognised assessor verdict");
            default
        }),
        None => default,
    }
}

fn read_scores(value: &Value) -> BTreeMap<String, u8> {
    let mut scores = BTreeMap::new();
    if let Some(Value::Object(map)) = value.get("scores") {
        for (key, score) in map {
            if let Some(score) = score_value(score) {
                scores.insert(key.clone(), score);
            }
        }
    }
    // 部分模型把分数平铺在顶层
    for key in QA_DIMENSIONS {
        if scores.contains_key(*key) {
            continue;
        }
        if let Some(score) = value.get(*key).and_then(score_value) {
            scores.insert(key.to_string(), score);
        }
    }
    if let Some(score) = value.get("overall_score").and_then(score_value) {
        scores.entry("overall".to_string()).or_insert(score);
    }
    scores
}

/// 分数接受整数、小数与 "8/10" 形式的字符串
pub(crate) fn score_value(value: &Value) -> Option<u8> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.split('/').next()?.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if score.is_finite() {
        Some(score.round().clamp(0.0, 10.0) as u8)
    } else {
        None
    }
}

pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => map
                    .get("description")
                    .or_else(|| map.get("issue"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .filter(|s| !s.trim().is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn revision_task(item: &Value) -> Option<RevisionTask> {
    match item {
        Value::String(description) if !description.trim().is_empty() => Some(RevisionTask {
            priority: Priority::Medium,
            description: description.clone(),
        }),
        Value::Object(map) => {
            let description = map
                .get("description")
                .or_else(|| map.get("task"))
                .and_then(Value::as_str)?;
            Some(RevisionTask {
                priority: map
                    .get("priority")
                    .and_then(Value::as_str)
                    .map(Priority::from_loose)
                    .unwrap_or(Priority::Medium),
                description: description.to_string(),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::assessment::Approval;

    #[test]
    fn test_parse_approved_report() {
        let raw = r#"Here is my review:
```json
{"scores": {"structure": 8, "pacing": "7", "overall": 8},
 "approval": "approved",
 "major_issues": ["Act 2 sags"],
 "revision_tasks": [{"priority": "major", "description": "Tighten act 2"}, "Rename the ship"],
 "reviewer_notes": "Solid."}
```"#;
        let report = parse_qa(GateScope::Series, raw);
        assert_eq!(report.approval, Approval::Approved);
        assert_eq!(report.overall(), Some(8));
        assert_eq!(report.scores["pacing"], 7);
        assert_eq!(report.scores["theme_integration"], 7);
        assert_eq!(report.revision_tasks[0].priority, Priority::High);
        assert_eq!(report.revision_tasks[1].priority, Priority::Medium);
        assert!(!report.fallback);
    }

    #[test]
    fn test_critical_issue_blocks_approval() {
        let raw = r#"{"scores": {"overall": 9}, "approval": "approved", "critical_issues": ["Protagonist dies in chapter 1"]}"#;
        let report = parse_qa(GateScope::Book(1), raw);
        assert!(report.has_critical());
        assert!(!report.passes());
    }

    #[test]
    fn test_low_overall_fails() {
        let report = parse_qa(GateScope::Final, r#"{"scores": {"overall": "6/10"}, "approval": "approved"}"#);
        assert_eq!(report.overall(), Some(6));
        assert!(!report.passes());
    }

    #[test]
    fn test_overall_from_mean() {
        let report = parse_qa(GateScope::Series, r#"{"scores": {"structure": 4, "pacing": 5}}"#);
        assert_eq!(report.overall(), Some(5));
    }

    #[test]
    fn test_model_verdict_is_kept() {
        let report = parse_qa(
            GateScope::Series,
            r#"{"scores": {"overall": 8}, "approval": "needs_revision", "major_issues": ["Stakes unclear"]}"#,
        );
        assert_eq!(report.approval, Approval::NeedsRevision);
        assert_eq!(report.overall(), Some(8));
        assert!(!report.passes());
    }

    #[test]
    fn test_missing_verdict_defaults_to_needs_revision() {
        let report = parse_qa(GateScope::Series, r#"{"scores": {"overall": 9}}"#);
        assert_eq!(report.approval, Approval::NeedsRevision);
        assert!(!report.passes());
    }

    #[test]
    fn test_blocked_without_scores_is_not_given_default_score() {
        let report = parse_qa(
            GateScope::Book(1),
            r#"{"approval": "blocked", "major_issues": ["Book contradicts the series premise"]}"#,
        );
        assert_eq!(report.approval, Approval::Blocked);
        assert!(report.scores.is_empty());
        assert_eq!(report.overall(), None);
        assert!(!report.fallback);
        assert!(!report.passes());
    }

    #[test]
    fn test_unparseable_falls_back() {
        for raw in ["", "The draft looks fine to me."] {
            let report = parse_qa(GateScope::Series, raw);
            assert!(report.fallback);
            assert_eq!(report.approval, Approval::Approved);
            assert_eq!(report.overall(), Some(7));
            assert_eq!(report.reviewer_notes, FALLBACK_NOTE);
        }
    }
}
