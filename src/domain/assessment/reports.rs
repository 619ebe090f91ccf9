//! Assessment Context - 评审报告
//!
//! QA 报告与设定一致性报告都是只读审计产物：追加到历史，不修改内容。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::content::{Character, Location, LoreElement, WorldElement};

/// QA 通过所需的最低总分
pub const QA_PASS_SCORE: u8 = 7;

/// 一致性检查通过所需的最低分
pub const CONSISTENCY_PASS_SCORE: u8 = 8;

/// 评审失败或缺失时使用的默认分数
pub const FALLBACK_SCORE: u8 = 7;

/// QA 必需的评分维度
pub const QA_DIMENSIONS: &[&str] = &[
    "structure",
    "pacing",
    "character_arcs",
    "theme_integration",
    "consistency",
    "overall",
];

/// 评审结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approval {
    Approved,
    NeedsRevision,
    Blocked,
}

impl Approval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Approval::Approved => "approved",
            Approval::NeedsRevision => "needs_revision",
            Approval::Blocked => "blocked",
        }
    }

    /// 宽松解析评审结论，无法识别时返回 None
    pub fn from_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "approved" | "approve" | "pass" | "passed" => Some(Approval::Approved),
            "needs_revision" | "revise" | "revision" | "needs_work" => Some(Approval::NeedsRevision),
            "blocked" | "block" | "rejected" | "reject" => Some(Approval::Blocked),
            _ => None,
        }
    }
}

/// 修订任务优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// 宽松解析："major" 视为 high，未知值视为 medium
    pub fn from_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "critical" | "blocker" => Priority::Critical,
            "high" | "major" => Priority::High,
            "low" | "minor" => Priority::Low,
            _ => Priority::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

/// 违规严重度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    pub fn from_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "minor" | "low" => Severity::Minor,
            _ => Severity::Major,
        }
    }
}

/// 修订任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionTask {
    pub priority: Priority,
    pub description: String,
}

/// 质量门作用范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "book_number", rename_all = "snake_case")]
pub enum GateScope {
    /// 系列设定完成后
    Series,
    /// 单本书大纲完成后
    Book(u32),
    /// 全部正文完成后
    Final,
}

impl GateScope {
    pub fn label(&self) -> String {
        match self {
            GateScope::Series => "series".to_string(),
            GateScope::Book(n) => format!("book_{}", n),
            GateScope::Final => "final".to_string(),
        }
    }
}

impl fmt::Display for GateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// QA 报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    pub timestamp: DateTime<Utc>,
    pub scope: GateScope,
    /// 维度 → 1..=10
    pub scores: BTreeMap<String, u8>,
    #[serde(default)]
    pub major_issues: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub revision_tasks: Vec<RevisionTask>,
    pub approval: Approval,
    #[serde(default)]
    pub reviewer_notes: String,
    /// 评审输出不可解析时的降级自动通过
    #[serde(default)]
    pub fallback: bool,
}

impl QaReport {
    /// 构建报告，`approval` 为评审模型自己给出的结论
    ///
    /// 只要给出了任一分数，缺失维度补默认分；一个分数都没有时保持未评分。
    pub fn new(
        scope: GateScope,
        mut scores: BTreeMap<String, u8>,
        major_issues: Vec<String>,
        strengths: Vec<String>,
        revision_tasks: Vec<RevisionTask>,
        approval: Approval,
        reviewer_notes: String,
    ) -> Self {
        if !scores.is_empty() {
            for dimension in QA_DIMENSIONS {
                scores.entry(dimension.to_string()).or_insert(FALLBACK_SCORE);
            }
        }
        for score in scores.values_mut() {
            *score = (*score).clamp(1, 10);
        }
        Self {
            timestamp: Utc::now(),
            scope,
            scores,
            major_issues,
            strengths,
            revision_tasks,
            approval,
            reviewer_notes,
            fallback: false,
        }
    }

    /// 降级通过（评审输出为空或无法解析）
    pub fn fallback(scope: GateScope, note: impl Into<String>) -> Self {
        let scores = QA_DIMENSIONS
            .iter()
            .map(|d| (d.to_string(), FALLBACK_SCORE))
            .collect();
        let mut report = Self::new(
            scope,
            scores,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Approval::Approved,
            note.into(),
        );
        report.fallback = true;
        report
    }

    /// 未评分时为 None
    pub fn overall(&self) -> Option<u8> {
        self.scores.get("overall").copied()
    }

    /// 用于日志与反馈的总分文本
    pub fn overall_label(&self) -> String {
        match self.overall() {
            Some(score) => format!("{}/10", score),
            None => "unscored".to_string(),
        }
    }

    pub fn has_critical(&self) -> bool {
        self.revision_tasks
            .iter()
            .any(|t| t.priority == Priority::Critical)
    }

    /// 结论为 approved、总分 ≥ 7 且无关键问题
    pub fn passes(&self) -> bool {
        self.approval == Approval::Approved
            && self.overall().is_some_and(|s| s >= QA_PASS_SCORE)
            && !self.has_critical()
    }
}

/// 设定违规
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoreViolation {
    #[serde(rename = "type")]
    pub violation_type: String,
    pub element: String,
    pub violation: String,
    pub severity: Severity,
}

/// 新发现的设定候选
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoreCandidate {
    #[serde(rename = "type")]
    pub lore_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub should_add: bool,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub significance: Option<String>,
    #[serde(default)]
    pub rules: Vec<String>,
}

impl LoreCandidate {
    /// 转换为设定条目
    ///
    /// character/location 之外的类型（technology, magic, species, faction,
    /// organization 以及未知类型）一律作为世界观元素
    pub fn to_element(&self) -> LoreElement {
        match self.lore_type.trim().to_lowercase().as_str() {
            "character" => LoreElement::Character(Character {
                name: self.name.clone(),
                role: self.role.clone().unwrap_or_else(|| "supporting".to_string()),
                description: self.description.clone(),
                traits: self.traits.clone(),
                relationships: Vec::new(),
            }),
            "location" => LoreElement::Location(Location {
                name: self.name.clone(),
                description: self.description.clone(),
                significance: self
                    .significance
                    .clone()
                    .unwrap_or_else(|| "Mentioned in story".to_string()),
            }),
            other => LoreElement::WorldElement(WorldElement {
                name: self.name.clone(),
                element_type: if other.is_empty() || other == "world_element" {
                    "other".to_string()
                } else {
                    other.to_string()
                },
                description: self.description.clone(),
                rules: self.rules.clone(),
            }),
        }
    }
}

/// 设定一致性报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub timestamp: DateTime<Utc>,
    pub scope: GateScope,
    pub consistency_score: u8,
    #[serde(default)]
    pub violations: Vec<LoreViolation>,
    #[serde(default)]
    pub new_lore: Vec<LoreCandidate>,
    pub approval: Approval,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub fallback: bool,
}

impl ConsistencyReport {
    pub fn new(
        scope: GateScope,
        consistency_score: u8,
        violations: Vec<LoreViolation>,
        new_lore: Vec<LoreCandidate>,
        approval: Approval,
        notes: String,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            scope,
            consistency_score: consistency_score.clamp(1, 10),
            violations,
            new_lore,
            approval,
            notes,
            fallback: false,
        }
    }

    pub fn fallback(scope: GateScope, note: impl Into<String>) -> Self {
        let mut report = Self::new(
            scope,
            FALLBACK_SCORE,
            Vec::new(),
            Vec::new(),
            Approval::Approved,
            note.into(),
        );
        report.fallback = true;
        report
    }

    pub fn has_critical(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.severity == Severity::Critical)
    }

    /// 结论为 approved、分数 ≥ 8 且无关键违规
    pub fn passes(&self) -> bool {
        self.approval == Approval::Approved
            && self.consistency_score >= CONSISTENCY_PASS_SCORE
            && !self.has_critical()
    }

    /// 应当加入设定库的候选
    pub fn additions(&self) -> Vec<LoreElement> {
        self.new_lore
            .iter()
            .filter(|c| c.should_add)
            .map(LoreCandidate::to_element)
            .collect()
    }
}

/// 质量门审计记录（每次评审一条，无论通过与否）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateRecord {
    pub scope: GateScope,
    pub attempt: u32,
    pub qa: QaReport,
    #[serde(default)]
    pub consistency: Option<ConsistencyReport>,
    pub approved: bool,
}
