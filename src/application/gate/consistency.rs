//! 设定一致性评审结果解析

use serde_json::Value;

use crate::application::extraction::extract;
use crate::domain::assessment::{
    Approval, ConsistencyReport, GateScope, LoreCandidate, LoreViolation, Severity, FALLBACK_SCORE,
};

use super::qa::{score_value, string_list, verdict, FALLBACK_NOTE};

pub fn parse_consistency(scope: GateScope, raw: &str) -> ConsistencyReport {
    let value = match extract(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(scope = %scope, kind = %e.kind, "Lore response unusable, falling back to automatic approval");
            return ConsistencyReport::fallback(scope, FALLBACK_NOTE);
        }
    };

    let violations = match value.get("lore_violations").or_else(|| value.get("violations")) {
        Some(Value::Array(items)) => items.iter().filter_map(violation).collect(),
        _ => Vec::new(),
    };
    let new_lore = match value.get("new_lore_detected").or_else(|| value.get("new_lore")) {
        Some(Value::Array(items)) => items.iter().filter_map(candidate).collect(),
        _ => Vec::new(),
    };

    ConsistencyReport::new(
        scope,
        value
            .get("consistency_score")
            .and_then(score_value)
            .unwrap_or(FALLBACK_SCORE),
        violations,
        new_lore,
        verdict(&value, Approval::Approved),
        text(&value, "notes"),
    )
}

fn text(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn violation(item: &Value) -> Option<LoreViolation> {
    let Value::Object(_) = item else {
        return None;
    };
    let description = item
        .get("violation")
        .or_else(|| item.get("description"))
        .and_then(Value::as_str)?;
    Some(LoreViolation {
        violation_type: text(item, "type"),
        element: text(item, "element"),
        violation: description.to_string(),
        severity: item
            .get("severity")
            .and_then(Value::as_str)
            .map(Severity::from_loose)
            .unwrap_or(Severity::Major),
    })
}

fn candidate(item: &Value) -> Option<LoreCandidate> {
    let name = item.get("name").and_then(Value::as_str)?.trim();
    if name.is_empty() {
        return None;
    }
    let should_add = match item.get("should_add") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes"),
        _ => false,
    };
    let optional = |key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };
    Some(LoreCandidate {
        lore_type: text(item, "type"),
        name: name.to_string(),
        description: text(item, "description"),
        should_add,
        role: optional("role"),
        traits: string_list(item.get("traits")),
        significance: optional("significance"),
        rules: string_list(item.get("rules")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::assessment::Approval;
    use crate::domain::content::LoreElement;

    #[test]
    fn test_parse_with_new_lore() {
        let raw = r#"{
            "lore_violations": [{"type": "character", "element": "Mara", "violation": "Eye colour changed", "severity": "minor"}],
            "new_lore_detected": [
                {"type": "faction", "name": "Tide Wardens", "description": "Harbor militia", "should_add": true, "rules": "Never leave port"},
                {"type": "character", "name": "Old Pell", "should_add": "yes", "role": "mentor"},
                {"type": "location", "name": "Dry Dock", "should_add": false},
                {"type": "location", "name": "  "}
            ],
            "consistency_score": 9,
            "notes": "Minor drift."
        }"#;
        let report = parse_consistency(GateScope::Book(2), raw);
        assert_eq!(report.approval, Approval::Approved);
        assert_eq!(report.violations[0].severity, Severity::Minor);
        assert_eq!(report.new_lore.len(), 3);

        let additions = report.additions();
        assert_eq!(additions.len(), 2);
        match &additions[0] {
            LoreElement::WorldElement(w) => {
                assert_eq!(w.element_type, "faction");
                assert_eq!(w.rules, vec!["Never leave port"]);
            }
            other => panic!("unexpected element: {:?}", other),
        }
        assert!(matches!(&additions[1], LoreElement::Character(c) if c.role == "mentor"));
    }

    #[test]
    fn test_critical_violation_fails() {
        let raw = r#"{"lore_violations": [{"element": "Tidecraft", "violation": "Works on land", "severity": "critical"}], "consistency_score": 9}"#;
        let report = parse_consistency(GateScope::Series, raw);
        assert_eq!(report.approval, Approval::Approved);
        assert!(!report.passes());
    }

    #[test]
    fn test_low_score_fails() {
        let report = parse_consistency(GateScope::Series, r#"{"consistency_score": 7}"#);
        assert!(!report.passes());
    }

    #[test]
    fn test_needs_revision_verdict_fails_despite_score() {
        let report = parse_consistency(
            GateScope::Series,
            r#"{"consistency_score": 9, "approval": "needs_revision", "notes": "Timeline drift"}"#,
        );
        assert_eq!(report.approval, Approval::NeedsRevision);
        assert!(!report.passes());
    }

    #[test]
    fn test_unparseable_falls_back_approved() {
        let report = parse_consistency(GateScope::Final, "no json");
        assert!(report.fallback);
        assert_eq!(report.approval, Approval::Approved);
        assert_eq!(report.consistency_score, 7);
    }
}
