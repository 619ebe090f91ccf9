//! Retry Controller
//!
//! 每次尝试产出一个独立的 `AttemptResult`：提取 → 字段转换 → 契约评估。
//! 决策只依赖本次结果，上一次的违规不会带入下一次评估。

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::application::coerce::CoercionError;
use crate::application::error::PipelineError;
use crate::application::extraction::{extract, raw_sample};
use crate::application::generator::{Generator, StageRequest};
use crate::domain::content::Stage;

use super::{corrective_message, Contract, Violation};

/// 契约在重试耗尽后仍未满足
#[derive(Debug, Clone, Error, Serialize)]
#[error("Contract violation at {stage} ({unit}): {field} expected {expected}, got {actual} after {attempts} attempts")]
pub struct ContractViolation {
    pub stage: Stage,
    pub unit: String,
    pub field: String,
    pub expected: String,
    pub actual: String,
    pub attempts: u32,
    pub raw_sample: String,
    /// 最后一次尝试的全部违规
    pub violations: Vec<Violation>,
}

/// 单次尝试的结果
#[derive(Debug)]
pub struct AttemptResult<T> {
    pub parsed: Option<T>,
    pub violations: Vec<Violation>,
    pub raw_text: String,
}

impl<T> AttemptResult<T> {
    /// 对原始文本执行提取、转换与契约评估
    pub fn evaluate<P>(raw_text: String, contract: &Contract<T>, parse: &P) -> Self
    where
        P: Fn(&Value) -> Result<T, Vec<CoercionError>>,
    {
        let value = match extract(&raw_text) {
            Ok(value) => value,
            Err(e) => {
                return Self {
                    parsed: None,
                    violations: vec![Violation::extraction(e.kind.to_string())],
                    raw_text,
                }
            }
        };

        match parse(&value) {
            Ok(candidate) => Self {
                violations: contract.evaluate(&candidate),
                parsed: Some(candidate),
                raw_text,
            },
            Err(errors) => Self {
                parsed: None,
                violations: errors
                    .into_iter()
                    .map(|e| Violation::coercion(e.path, e.message))
                    .collect(),
                raw_text,
            },
        }
    }

    /// 违规全部可由 Auto-Corrector 修复
    pub fn correctable(&self) -> bool {
        self.parsed.is_some()
            && !self.violations.is_empty()
            && self.violations.iter().all(|v| v.correctable)
    }
}

/// 通过契约的结果
#[derive(Debug)]
pub struct Accepted<T> {
    pub value: T,
    /// 模型调用次数
    pub attempts: u32,
    /// 是否经过自动修正
    pub corrected: bool,
}

/// Retry Controller
#[derive(Debug, Clone, Copy)]
pub struct RetryController {
    max_retries: u32,
}

impl RetryController {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// 生成直到满足契约，或在 `max_retries` 次尝试后返回 `ContractViolation`
    pub async fn run<T, P>(
        &self,
        generator: &Generator,
        request: &StageRequest,
        contract: &Contract<T>,
        parse: P,
    ) -> Result<Accepted<T>, PipelineError>
    where
        P: Fn(&Value) -> Result<T, Vec<CoercionError>>,
    {
        let mut corrective: Option<String> = None;
        let mut last: Option<AttemptResult<T>> = None;

        for attempt in 1..=self.max_retries {
            let raw = generator
                .generate(request, corrective.as_deref())
                .await
                .map_err(|source| PipelineError::Api {
                    stage: request.stage,
                    source,
                })?;

            let result = AttemptResult::evaluate(raw, contract, &parse);

            let result = match result {
                AttemptResult {
                    parsed: Some(value),
                    violations,
                    ..
                } if violations.is_empty() => {
                    tracing::debug!(stage = %request.stage, unit = %request.unit, attempt, "Contract satisfied");
                    return Ok(Accepted {
                        value,
                        attempts: attempt,
                        corrected: false,
                    });
                }
                other => other,
            };

            let result = match self.try_autocorrect(request, contract, result) {
                Ok(value) => {
                    return Ok(Accepted {
                        value,
                        attempts: attempt,
                        corrected: true,
                    })
                }
                Err(result) => result,
            };

            tracing::warn!(
                stage = %request.stage,
                unit = %request.unit,
                attempt,
                max_retries = self.max_retries,
                violations = result.violations.len(),
                first = %result.violations.first().map(|v| v.message.as_str()).unwrap_or(""),
                "Contract check failed"
            );

            corrective = Some(corrective_message(&result.violations));
            last = Some(result);
        }

        Err(self.exhausted(request, last))
    }

    /// 全部违规可修正时执行自动修正；修正后仍有违规则交回结果
    fn try_autocorrect<T>(
        &self,
        request: &StageRequest,
        contract: &Contract<T>,
        result: AttemptResult<T>,
    ) -> Result<T, AttemptResult<T>> {
        if !result.correctable() {
            return Err(result);
        }
        let AttemptResult {
            parsed, raw_text, ..
        } = result;
        let Some(mut candidate) = parsed else {
            return Err(AttemptResult {
                parsed: None,
                violations: Vec::new(),
                raw_text,
            });
        };

        let corrected = contract.autocorrect(&mut candidate);
        let remaining = contract.evaluate(&candidate);
        if remaining.is_empty() {
            tracing::info!(
                stage = %request.stage,
                unit = %request.unit,
                rules = corrected,
                "Auto-corrected aggregate values"
            );
            Ok(candidate)
        } else {
            Err(AttemptResult {
                parsed: Some(candidate),
                violations: remaining,
                raw_text,
            })
        }
    }

    fn exhausted<T>(&self, request: &StageRequest, last: Option<AttemptResult<T>>) -> PipelineError {
        let (violations, raw_text) = match last {
            Some(result) => (result.violations, result.raw_text),
            None => (Vec::new(), String::new()),
        };
        let (field, expected, actual) = violations
            .first()
            .map(|v| (v.field.clone(), v.expected.clone(), v.actual.clone()))
            .unwrap_or_default();

        PipelineError::Contract(Box::new(ContractViolation {
            stage: request.stage,
            unit: request.unit.clone(),
            field,
            expected,
            actual,
            attempts: self.max_retries,
            raw_sample: raw_sample(&raw_text),
            violations,
        }))
    }
}
