//! Stage Contract
//!
//! 声明式结构规则：
//! - `exact`: 数量必须等于 N
//! - `range`: 数量落在 [min, max]
//! - `range_each`: 每个子项的数量落在 [min, max]
//! - `tolerance`: 兄弟数值之和落在 target ± pct%，超出时可按比例自动修正
//!
//! 每条违规都带具体数字，用于生成纠正指令。

mod autocorrect;
mod retry;

use serde::Serialize;

pub use autocorrect::{rebalance, within_tolerance};
pub use retry::{Accepted, AttemptResult, ContractViolation, RetryController};

/// 违规类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// 数量不符（只能靠重新生成补齐）
    Count,
    /// 数值总和偏离目标
    Aggregate,
    /// 响应中没有可用的 JSON 对象
    Extraction,
    /// 字段类型或必填项问题
    Coercion,
}

/// 单条违规
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub expected: String,
    pub actual: String,
    pub kind: ViolationKind,
    /// 可由 Auto-Corrector 修复
    pub correctable: bool,
    /// 给模型看的纠正说明
    pub message: String,
}

impl Violation {
    pub fn extraction(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            field: "response".to_string(),
            expected: "a JSON object".to_string(),
            actual: detail.clone(),
            kind: ViolationKind::Extraction,
            correctable: false,
            message: format!(
                "Your previous response did not contain a valid JSON object ({}). Respond with a single JSON object only.",
                detail
            ),
        }
    }

    pub fn coercion(path: impl Into<String>, problem: impl Into<String>) -> Self {
        let path = path.into();
        let problem = problem.into();
        Self {
            message: format!("Field `{}` is invalid: {}.", path, problem),
            field: path,
            expected: problem,
            actual: "invalid".to_string(),
            kind: ViolationKind::Coercion,
            correctable: false,
        }
    }
}

fn plural(n: usize, unit: &str) -> String {
    if n == 1 {
        unit.to_string()
    } else {
        format!("{}s", unit)
    }
}

/// 单条规则
///
/// 单位为 `word` 的 `range` 使用 TOO SHORT / TOO LONG 措辞
///
/// 规则通过函数指针读取候选结果，契约本身不持有候选
pub enum Rule<T> {
    Exact {
        field: &'static str,
        unit: &'static str,
        expected: usize,
        count: fn(&T) -> usize,
    },
    Range {
        field: &'static str,
        unit: &'static str,
        min: usize,
        max: Option<usize>,
        count: fn(&T) -> usize,
    },
    RangeEach {
        field: &'static str,
        item: &'static str,
        unit: &'static str,
        min: usize,
        max: Option<usize>,
        counts: fn(&T) -> Vec<usize>,
    },
    Tolerance {
        field: &'static str,
        target: u32,
        pct: u32,
        parts: fn(&T) -> Vec<u32>,
        apply: fn(&mut T, &[u32]),
    },
}

impl<T> Rule<T> {
    fn evaluate(&self, candidate: &T) -> Vec<Violation> {
        match self {
            Rule::Exact {
                field,
                unit,
                expected,
                count,
            } => {
                let actual = count(candidate);
                if actual == *expected {
                    return Vec::new();
                }
                let delta = if actual < *expected {
                    format!(
                        "You are missing {} {}.",
                        expected - actual,
                        plural(expected - actual, unit)
                    )
                } else {
                    format!(
                        "You have {} extra {}.",
                        actual - expected,
                        plural(actual - expected, unit)
                    )
                };
                vec![Violation {
                    field: field.to_string(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                    kind: ViolationKind::Count,
                    correctable: false,
                    message: format!(
                        "You generated {} {} but MUST generate exactly {}. {}",
                        actual,
                        plural(actual, unit),
                        expected,
                        delta
                    ),
                }]
            }
            Rule::Range {
                field,
                unit,
                min,
                max,
                count,
            } => range_violation(field, unit, *min, *max, count(candidate), None)
                .into_iter()
                .collect(),
            Rule::RangeEach {
                field,
                item,
                unit,
                min,
                max,
                counts,
            } => counts(candidate)
                .into_iter()
                .enumerate()
                .filter_map(|(index, actual)| {
                    range_violation(field, unit, *min, *max, actual, Some((*item, index + 1)))
                })
                .collect(),
            Rule::Tolerance {
                field,
                target,
                pct,
                parts,
                ..
            } => {
                let values = parts(candidate);
                let sum: u64 = values.iter().map(|&v| v as u64).sum();
                if values.is_empty() || *target == 0 || within_tolerance(sum, *target, *pct) {
                    return Vec::new();
                }
                vec![Violation {
                    field: field.to_string(),
                    expected: format!("{} (±{}%)", target, pct),
                    actual: sum.to_string(),
                    kind: ViolationKind::Aggregate,
                    correctable: sum > 0,
                    message: format!(
                        "The {} add up to {} but MUST add up to {} (±{}%).",
                        field, sum, target, pct
                    ),
                }]
            }
        }
    }

    /// 对超出容差的规则执行自动修正，返回是否修改了候选
    fn correct(&self, candidate: &mut T) -> bool {
        let Rule::Tolerance {
            target,
            pct,
            parts,
            apply,
            ..
        } = self
        else {
            return false;
        };
        let values = parts(candidate);
        let sum: u64 = values.iter().map(|&v| v as u64).sum();
        if *target == 0 || within_tolerance(sum, *target, *pct) {
            return false;
        }
        match rebalance(&values, *target) {
            Some(corrected) => {
                apply(candidate, &corrected);
                true
            }
            None => false,
        }
    }
}

fn range_violation(
    field: &str,
    unit: &str,
    min: usize,
    max: Option<usize>,
    actual: usize,
    item: Option<(&str, usize)>,
) -> Option<Violation> {
    let too_few = actual < min;
    let too_many = max.map(|m| actual > m).unwrap_or(false);
    if !too_few && !too_many {
        return None;
    }

    let (field_path, owner) = match item {
        Some((item, n)) => (format!("{}[{}].{}", item, n, field), format!("{} {} has", item, n)),
        None => (field.to_string(), "You generated".to_string()),
    };
    let allowed = match max {
        Some(max) => format!("{}-{}", min, max),
        None => format!("at least {}", min),
    };
    let message = if unit == "word" && item.is_none() {
        let mut label = field.to_string();
        if let Some(first) = label.get(0..1).map(str::to_uppercase) {
            label.replace_range(0..1, &first);
        }
        if too_few {
            format!(
                "{} is TOO SHORT: {} words, required {}. Add at least {} more words.",
                label,
                actual,
                allowed,
                min - actual
            )
        } else {
            format!(
                "{} is TOO LONG: {} words, required {}. Cut at least {} words.",
                label,
                actual,
                allowed,
                actual - max.unwrap_or(actual)
            )
        }
    } else if too_few {
        format!(
            "TOO FEW {}: {} {} {}, required {}. Add at least {} more.",
            field,
            owner,
            actual,
            plural(actual, unit),
            allowed,
            min - actual
        )
    } else {
        format!(
            "TOO MANY {}: {} {} {}, required {}. Remove at least {}.",
            field,
            owner,
            actual,
            plural(actual, unit),
            allowed,
            actual - max.unwrap_or(actual)
        )
    };

    Some(Violation {
        field: field_path,
        expected: allowed,
        actual: actual.to_string(),
        kind: ViolationKind::Count,
        correctable: false,
        message,
    })
}

/// 阶段契约
pub struct Contract<T> {
    rules: Vec<Rule<T>>,
}

impl<T> Default for Contract<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Contract<T> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn exact(
        mut self,
        field: &'static str,
        unit: &'static str,
        expected: usize,
        count: fn(&T) -> usize,
    ) -> Self {
        self.rules.push(Rule::Exact {
            field,
            unit,
            expected,
            count,
        });
        self
    }

    pub fn range(
        mut self,
        field: &'static str,
        unit: &'static str,
        min: usize,
        max: Option<usize>,
        count: fn(&T) -> usize,
    ) -> Self {
        self.rules.push(Rule::Range {
            field,
            unit,
            min,
            max,
            count,
        });
        self
    }

    pub fn range_each(
        mut self,
        field: &'static str,
        item: &'static str,
        unit: &'static str,
        min: usize,
        max: Option<usize>,
        counts: fn(&T) -> Vec<usize>,
    ) -> Self {
        self.rules.push(Rule::RangeEach {
            field,
            item,
            unit,
            min,
            max,
            counts,
        });
        self
    }

    pub fn tolerance(
        mut self,
        field: &'static str,
        target: u32,
        pct: u32,
        parts: fn(&T) -> Vec<u32>,
        apply: fn(&mut T, &[u32]),
    ) -> Self {
        self.rules.push(Rule::Tolerance {
            field,
            target,
            pct,
            parts,
            apply,
        });
        self
    }

    /// 评估全部规则，收集所有违规
    pub fn evaluate(&self, candidate: &T) -> Vec<Violation> {
        self.rules
            .iter()
            .flat_map(|rule| rule.evaluate(candidate))
            .collect()
    }

    /// 对所有可修正规则执行自动修正，返回修正的规则数
    pub fn autocorrect(&self, candidate: &mut T) -> usize {
        self.rules
            .iter()
            .filter(|rule| rule.correct(candidate))
            .count()
    }
}

/// 汇总纠正指令
pub fn corrective_message(violations: &[Violation]) -> String {
    let mut text = String::from("IMPORTANT: your previous response was rejected.\n");
    for violation in violations {
        text.push_str("- ");
        text.push_str(&violation.message);
        text.push('\n');
    }
    text.push_str("Respond again with the complete JSON object that fixes every problem above.");
    text
}
