//! Quality Gate
//!
//! 状态机：
//!
//! ```text
//! Pending → ScoringQa ─pass→ ScoringLore ─pass→ Approved
//!               │fail              │fail
//!               └──────→ RetryOrHalt ←┘
//!                         │attempts left → 重新生成整个单元 → Pending
//!                         └otherwise     → Halted（致命）
//! ```
//!
//! 每次评审（无论通过与否）都记录到 `project.qa_reports`。
//! 通过时把新设定并入项目并写入 Lore Store。

mod consistency;
mod qa;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::application::error::PipelineError;
use crate::application::generator::{Generator, StageRequest};
use crate::application::ports::{InvokeOptions, LoreStorePort};
use crate::application::stages::{book, prompts, series};
use crate::domain::assessment::{ConsistencyReport, GateRecord, GateScope, QaReport, Severity};
use crate::domain::content::{Project, ProjectStatus, Stage};

pub use consistency::parse_consistency;
pub use qa::{parse_qa, FALLBACK_NOTE};

/// 质量门在重试耗尽后仍未通过
#[derive(Debug, Clone, Error, Serialize)]
#[error("Quality gate halted at {scope} after {attempts} assessments (QA overall {}, verdict {})", .qa.overall_label(), .qa.approval.as_str())]
pub struct QualityGateHalt {
    pub scope: GateScope,
    pub attempts: u32,
    /// 最后一次 QA 报告
    pub qa: QaReport,
    /// 最后一次一致性报告（QA 未通过时不评分）
    pub consistency: Option<ConsistencyReport>,
}

/// 质量门状态
#[derive(Debug)]
pub enum GateState {
    Pending,
    ScoringQa,
    ScoringLore {
        qa: QaReport,
    },
    RetryOrHalt {
        qa: QaReport,
        consistency: Option<ConsistencyReport>,
    },
    Approved {
        qa: QaReport,
        consistency: ConsistencyReport,
    },
    Halted {
        qa: QaReport,
        consistency: Option<ConsistencyReport>,
    },
}

impl GateState {
    pub fn name(&self) -> &'static str {
        match self {
            GateState::Pending => "pending",
            GateState::ScoringQa => "scoring_qa",
            GateState::ScoringLore { .. } => "scoring_lore",
            GateState::RetryOrHalt { .. } => "retry_or_halt",
            GateState::Approved { .. } => "approved",
            GateState::Halted { .. } => "halted",
        }
    }
}

/// 通过结果
#[derive(Debug, Clone)]
pub struct GateOutcome {
    /// 评审次数
    pub attempts: u32,
    pub qa: QaReport,
    pub consistency: ConsistencyReport,
    /// 新并入的设定条目数
    pub lore_added: usize,
}

/// 质量门未通过时重新生成整个单元
#[async_trait]
pub trait UnitRegenerator: Send + Sync {
    async fn regenerate(
        &self,
        project: &mut Project,
        scope: GateScope,
        feedback: &str,
    ) -> Result<(), PipelineError>;
}

/// 评审结果 → 重新生成时附带的反馈
pub fn feedback(qa: &QaReport, consistency: Option<&ConsistencyReport>) -> String {
    let mut text = format!(
        "Quality review overall score: {}. Verdict: {}.\n",
        qa.overall_label(),
        qa.approval.as_str()
    );
    if !qa.major_issues.is_empty() {
        text.push_str("Major issues:\n");
        for issue in &qa.major_issues {
            text.push_str(&format!("- {}\n", issue));
        }
    }
    if !qa.revision_tasks.is_empty() {
        text.push_str("Revision tasks:\n");
        for task in &qa.revision_tasks {
            text.push_str(&format!("- [{}] {}\n", task.priority.as_str(), task.description));
        }
    }
    if let Some(consistency) = consistency {
        text.push_str(&format!(
            "Lore consistency score: {}/10.\n",
            consistency.consistency_score
        ));
        for v in &consistency.violations {
            let severity = match v.severity {
                Severity::Critical => "critical",
                Severity::Major => "major",
                Severity::Minor => "minor",
            };
            text.push_str(&format!("- [{}] {}: {}\n", severity, v.element, v.violation));
        }
    }
    if !qa.reviewer_notes.is_empty() {
        text.push_str(&format!("Reviewer notes: {}\n", qa.reviewer_notes));
    }
    text
}

/// 评审对象
pub fn assessment_content(project: &Project, scope: GateScope) -> Value {
    let series = &project.series;
    match scope {
        GateScope::Series => series::summary(series),
        GateScope::Book(n) => match series.book(n) {
            Some(b) => json!({
                "series": {"title": series.title, "premise": series.premise, "themes": series.themes},
                "book": book::summary(b),
            }),
            None => Value::Null,
        },
        GateScope::Final => json!({
            "title": series.title,
            "premise": series.premise,
            "total_word_count": series.total_word_count(),
            "books": series.books.iter().map(|b| json!({
                "book_number": b.book_number,
                "title": b.title,
                "word_count": b.current_word_count,
                "chapters": b.chapters.iter().map(|c| json!({
                    "chapter_number": c.chapter_number,
                    "title": c.title,
                    "purpose": c.purpose,
                    "word_count": c.actual_word_count,
                    "opening": c.scenes.first()
                        .and_then(|s| s.beats.first())
                        .and_then(|beat| beat.prose.as_ref())
                        .map(|p| p.content.split_whitespace().take(120).collect::<Vec<_>>().join(" ")),
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        }),
    }
}

fn scope_stage(scope: GateScope) -> Stage {
    match scope {
        GateScope::Series => Stage::Series,
        GateScope::Book(_) => Stage::Book,
        GateScope::Final => Stage::Prose,
    }
}

/// 质量门
pub struct QualityGate {
    generator: Arc<Generator>,
    qa_options: InvokeOptions,
    lore_options: InvokeOptions,
    lore: Option<Arc<dyn LoreStorePort>>,
    max_retries: u32,
}

impl QualityGate {
    /// `max_retries`: 未通过时允许重新生成的次数
    pub fn new(
        generator: Arc<Generator>,
        qa_options: InvokeOptions,
        lore_options: InvokeOptions,
        max_retries: u32,
    ) -> Self {
        Self {
            generator,
            qa_options,
            lore_options,
            lore: None,
            max_retries,
        }
    }

    pub fn with_lore_store(mut self, lore: Arc<dyn LoreStorePort>) -> Self {
        self.lore = Some(lore);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// 运行质量门直到通过或停机
    pub async fn run(
        &self,
        project: &mut Project,
        scope: GateScope,
        regenerator: &dyn UnitRegenerator,
    ) -> Result<GateOutcome, PipelineError> {
        let mut attempt = 0u32;
        let mut state = GateState::Pending;
        project.metadata.status = ProjectStatus::InReview;

        loop {
            tracing::debug!(scope = %scope, attempt, state = state.name(), "Quality gate transition");
            state = match state {
                GateState::Pending => {
                    attempt += 1;
                    GateState::ScoringQa
                }
                GateState::ScoringQa => {
                    let qa = self.score_qa(project, scope).await?;
                    tracing::info!(scope = %scope, attempt, overall = %qa.overall_label(), approval = qa.approval.as_str(), fallback = qa.fallback, "QA scored");
                    if qa.passes() {
                        GateState::ScoringLore { qa }
                    } else {
                        GateState::RetryOrHalt {
                            qa,
                            consistency: None,
                        }
                    }
                }
                GateState::ScoringLore { qa } => {
                    let consistency = self.score_lore(project, scope).await?;
                    tracing::info!(
                        scope = %scope,
                        attempt,
                        score = consistency.consistency_score,
                        violations = consistency.violations.len(),
                        fallback = consistency.fallback,
                        "Lore consistency scored"
                    );
                    if consistency.passes() || consistency.fallback {
                        GateState::Approved { qa, consistency }
                    } else {
                        GateState::RetryOrHalt {
                            qa,
                            consistency: Some(consistency),
                        }
                    }
                }
                GateState::RetryOrHalt { qa, consistency } => {
                    self.record(project, scope, attempt, &qa, consistency.as_ref(), false);
                    if attempt <= self.max_retries {
                        let text = feedback(&qa, consistency.as_ref());
                        tracing::warn!(scope = %scope, attempt, max_retries = self.max_retries, "Quality gate rejected, regenerating");
                        regenerator.regenerate(project, scope, &text).await?;
                        GateState::Pending
                    } else {
                        GateState::Halted { qa, consistency }
                    }
                }
                GateState::Approved { qa, consistency } => {
                    self.record(project, scope, attempt, &qa, Some(&consistency), true);
                    let lore_added = self.merge_lore(project, &consistency).await?;
                    project.metadata.status = ProjectStatus::Approved;
                    tracing::info!(scope = %scope, attempts = attempt, lore_added, "Quality gate approved");
                    return Ok(GateOutcome {
                        attempts: attempt,
                        qa,
                        consistency,
                        lore_added,
                    });
                }
                GateState::Halted { qa, consistency } => {
                    project.metadata.status = ProjectStatus::NeedsRevision;
                    tracing::error!(scope = %scope, attempts = attempt, overall = %qa.overall_label(), approval = qa.approval.as_str(), "Quality gate halted");
                    return Err(PipelineError::GateHalt(Box::new(QualityGateHalt {
                        scope,
                        attempts: attempt,
                        qa,
                        consistency,
                    })));
                }
            };
        }
    }

    async fn assess(
        &self,
        project: &Project,
        scope: GateScope,
        instructions: &str,
        context: String,
        options: &InvokeOptions,
    ) -> Result<String, PipelineError> {
        let request = StageRequest {
            stage: scope_stage(scope),
            unit: format!("{} gate", scope),
            project_id: project.id().to_string(),
            instructions: instructions.to_string(),
            context,
            options: options.clone(),
            use_lore: false,
        };
        self.generator
            .generate(&request, None)
            .await
            .map_err(|source| PipelineError::Api {
                stage: request.stage,
                source,
            })
    }

    async fn score_qa(&self, project: &Project, scope: GateScope) -> Result<QaReport, PipelineError> {
        let content = assessment_content(project, scope);
        let context = serde_json::to_string_pretty(&content).unwrap_or_else(|_| content.to_string());
        let raw = self
            .assess(project, scope, prompts::qa(), context, &self.qa_options)
            .await?;
        Ok(parse_qa(scope, &raw))
    }

    async fn score_lore(
        &self,
        project: &Project,
        scope: GateScope,
    ) -> Result<ConsistencyReport, PipelineError> {
        let content = assessment_content(project, scope);
        let context = format!(
            "Established lore:\n{}\n\nNew content:\n{}",
            serde_json::to_string_pretty(&project.series.lore).unwrap_or_default(),
            serde_json::to_string_pretty(&content).unwrap_or_else(|_| content.to_string()),
        );
        let raw = self
            .assess(project, scope, prompts::lore(), context, &self.lore_options)
            .await?;
        Ok(parse_consistency(scope, &raw))
    }

    fn record(
        &self,
        project: &mut Project,
        scope: GateScope,
        attempt: u32,
        qa: &QaReport,
        consistency: Option<&ConsistencyReport>,
        approved: bool,
    ) {
        project.qa_reports.push(GateRecord {
            scope,
            attempt,
            qa: qa.clone(),
            consistency: consistency.cloned(),
            approved,
        });
    }

    /// 新设定并入项目；写入 Lore Store 失败是致命错误
    async fn merge_lore(
        &self,
        project: &mut Project,
        consistency: &ConsistencyReport,
    ) -> Result<usize, PipelineError> {
        let added = project.series.lore.merge(consistency.additions());
        if let Some(lore) = &self.lore {
            let stored = lore.store_all(project).await?;
            tracing::debug!(project_id = %project.id(), stored, "Lore persisted");
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::generator::ApiRetryPolicy;
    use crate::application::ports::{
        ApiError, LoreEntry, LoreStoreError, ModelPort, ModelRole,
    };
    use crate::domain::assessment::Approval;
    use crate::domain::content::Series;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// 按角色分别排队的评审模型
    struct Assessors {
        qa: Mutex<VecDeque<String>>,
        lore: Mutex<VecDeque<String>>,
    }

    impl Assessors {
        fn new(qa: &[&str], lore: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                qa: Mutex::new(qa.iter().map(|s| s.to_string()).collect()),
                lore: Mutex::new(lore.iter().map(|s| s.to_string()).collect()),
            })
        }
    }

    fn next(queue: &Mutex<VecDeque<String>>) -> String {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl ModelPort for Assessors {
        async fn invoke(&self, _prompt: &str, options: &InvokeOptions) -> Result<String, ApiError> {
            match options.role {
                ModelRole::Qa => Ok(next(&self.qa)),
                ModelRole::Lore => Ok(next(&self.lore)),
                _ => Err(ApiError::Provider {
                    status: 400,
                    message: "unexpected role".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct CountingRegenerator {
        feedback: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl UnitRegenerator for CountingRegenerator {
        async fn regenerate(
            &self,
            _project: &mut Project,
            _scope: GateScope,
            feedback: &str,
        ) -> Result<(), PipelineError> {
            self.feedback.lock().unwrap().push(feedback.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingLore {
        stored: Mutex<usize>,
    }

    #[async_trait]
    impl LoreStorePort for RecordingLore {
        async fn store_all(&self, project: &Project) -> Result<usize, LoreStoreError> {
            *self.stored.lock().unwrap() += 1;
            Ok(project.series.lore.len())
        }

        async fn query(&self, _text: &str, _project_id: &str, _top_k: usize) -> Result<Vec<LoreEntry>, LoreStoreError> {
            Ok(Vec::new())
        }

        async fn delete_project(&self, _project_id: &str) -> Result<(), LoreStoreError> {
            Ok(())
        }
    }

    fn options(role: ModelRole) -> InvokeOptions {
        InvokeOptions {
            role,
            model: "m".to_string(),
            temperature: 0.5,
            max_tokens: 100,
            seed: None,
        }
    }

    fn gate(model: Arc<Assessors>, max_retries: u32) -> QualityGate {
        let generator = Arc::new(Generator::new(model, ApiRetryPolicy::new(1, Duration::ZERO)));
        QualityGate::new(generator, options(ModelRole::Qa), options(ModelRole::Lore), max_retries)
    }

    fn project() -> Project {
        Project::new("p1", Series::from_concept("Tidebound", "A drowned empire rises.", "Fantasy"))
    }

    const QA_PASS: &str = r#"{"scores": {"overall": 8}, "approval": "approved"}"#;
    const QA_FAIL: &str = r#"{"scores": {"overall": 5}, "approval": "needs_revision", "major_issues": ["Flat antagonist"]}"#;
    const QA_REVISE_HIGH_SCORE: &str = r#"{"scores": {"overall": 8}, "approval": "needs_revision", "major_issues": ["Subplot dropped"]}"#;
    const QA_BLOCKED_UNSCORED: &str = r#"{"approval": "blocked", "major_issues": ["Contradicts the series premise"]}"#;
    const LORE_PASS: &str = r#"{"consistency_score": 9, "new_lore_detected": [{"type": "location", "name": "Saltmarch", "should_add": true}]}"#;
    const LORE_FAIL: &str = r#"{"consistency_score": 5, "lore_violations": [{"element": "Mara", "violation": "Age changed", "severity": "major"}]}"#;

    #[tokio::test]
    async fn test_approve_first_pass_merges_lore() {
        let lore = Arc::new(RecordingLore::default());
        let gate = gate(Assessors::new(&[QA_PASS], &[LORE_PASS]), 3).with_lore_store(lore.clone());
        let regenerator = CountingRegenerator::default();
        let mut p = project();

        let outcome = gate.run(&mut p, GateScope::Series, &regenerator).await.unwrap();

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.lore_added, 1);
        assert_eq!(p.series.lore.locations[0].name, "Saltmarch");
        assert_eq!(*lore.stored.lock().unwrap(), 1);
        assert_eq!(p.qa_reports.len(), 1);
        assert!(p.qa_reports[0].approved);
        assert_eq!(p.metadata.status, ProjectStatus::Approved);
        assert!(regenerator.feedback.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_qa_failure_regenerates_with_feedback() {
        let gate = gate(Assessors::new(&[QA_FAIL, QA_PASS], &[LORE_PASS]), 3);
        let regenerator = CountingRegenerator::default();
        let mut p = project();

        let outcome = gate.run(&mut p, GateScope::Book(1), &regenerator).await.unwrap();

        assert_eq!(outcome.attempts, 2);
        let feedback = regenerator.feedback.lock().unwrap();
        assert_eq!(feedback.len(), 1);
        assert!(feedback[0].contains("overall score: 5/10"));
        assert!(feedback[0].contains("Verdict: needs_revision"));
        assert!(feedback[0].contains("- Flat antagonist"));
        // 失败记录没有一致性报告（QA 未通过时不评分）
        assert!(p.qa_reports[0].consistency.is_none());
        assert!(!p.qa_reports[0].approved);
        assert!(p.qa_reports[1].approved);
    }

    #[tokio::test]
    async fn test_lore_failure_regenerates() {
        let gate = gate(Assessors::new(&[QA_PASS], &[LORE_FAIL, LORE_PASS]), 3);
        let regenerator = CountingRegenerator::default();
        let mut p = project();

        gate.run(&mut p, GateScope::Series, &regenerator).await.unwrap();

        let feedback = regenerator.feedback.lock().unwrap();
        assert!(feedback[0].contains("Lore consistency score: 5/10"));
        assert!(feedback[0].contains("[major] Mara: Age changed"));
    }

    #[tokio::test]
    async fn test_halt_after_retries_exhausted() {
        let gate = gate(Assessors::new(&[QA_FAIL], &[LORE_PASS]), 3);
        let regenerator = CountingRegenerator::default();
        let mut p = project();

        let err = gate.run(&mut p, GateScope::Series, &regenerator).await.unwrap_err();

        assert_eq!(regenerator.feedback.lock().unwrap().len(), 3);
        assert_eq!(p.qa_reports.len(), 4);
        assert_eq!(p.metadata.status, ProjectStatus::NeedsRevision);
        match err {
            PipelineError::GateHalt(halt) => {
                assert_eq!(halt.attempts, 4);
                assert_eq!(halt.qa.overall(), Some(5));
                assert_eq!(halt.qa.major_issues, vec!["Flat antagonist"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unparseable_assessors_degrade_to_approval() {
        let gate = gate(Assessors::new(&["not json"], &[""]), 3);
        let regenerator = CountingRegenerator::default();
        let mut p = project();

        let outcome = gate.run(&mut p, GateScope::Final, &regenerator).await.unwrap();

        assert!(outcome.qa.fallback);
        assert!(outcome.consistency.fallback);
        assert_eq!(p.qa_reports[0].qa.reviewer_notes, FALLBACK_NOTE);
    }

    #[tokio::test]
    async fn test_needs_revision_verdict_rejects_despite_passing_score() {
        let gate = gate(Assessors::new(&[QA_REVISE_HIGH_SCORE], &[LORE_PASS]), 1);
        let regenerator = CountingRegenerator::default();
        let mut p = project();

        let err = gate.run(&mut p, GateScope::Series, &regenerator).await.unwrap_err();

        assert_eq!(regenerator.feedback.lock().unwrap().len(), 1);
        assert!(p.qa_reports.iter().all(|r| !r.approved));
        match err {
            PipelineError::GateHalt(halt) => {
                assert_eq!(halt.attempts, 2);
                assert_eq!(halt.qa.overall(), Some(8));
                assert_eq!(halt.qa.approval, Approval::NeedsRevision);
                assert!(halt.consistency.is_none());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blocked_verdict_without_scores_halts() {
        let gate = gate(Assessors::new(&[QA_BLOCKED_UNSCORED], &[LORE_PASS]), 0);
        let regenerator = CountingRegenerator::default();
        let mut p = project();

        let err = gate.run(&mut p, GateScope::Book(1), &regenerator).await.unwrap_err();

        assert!(regenerator.feedback.lock().unwrap().is_empty());
        let record = &p.qa_reports[0];
        assert!(!record.approved);
        assert!(!record.qa.fallback);
        assert_eq!(record.qa.approval, Approval::Blocked);
        assert!(record.qa.scores.is_empty());
        match err {
            PipelineError::GateHalt(halt) => {
                assert_eq!(halt.attempts, 1);
                assert_eq!(halt.qa.overall(), None);
                assert!(halt.to_string().contains("QA overall unscored, verdict blocked"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lore_needs_revision_verdict_rejects() {
        let lore_revise = r#"{"consistency_score": 9, "approval": "needs_revision", "notes": "Timeline drift"}"#;
        let gate = gate(Assessors::new(&[QA_PASS], &[lore_revise, LORE_PASS]), 2);
        let regenerator = CountingRegenerator::default();
        let mut p = project();

        let outcome = gate.run(&mut p, GateScope::Series, &regenerator).await.unwrap();

        assert_eq!(outcome.attempts, 2);
        assert!(!p.qa_reports[0].approved);
        assert_eq!(
            p.qa_reports[0].consistency.as_ref().map(|c| c.approval),
            Some(Approval::NeedsRevision)
        );
    }
}
