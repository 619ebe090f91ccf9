//! Assessment Context - 评审限界上下文
//!
//! QA 评分、设定一致性检查与质量门审计记录

mod reports;

pub use reports::{
    Approval, ConsistencyReport, GateRecord, GateScope, LoreCandidate, LoreViolation, Priority,
    QaReport, RevisionTask, Severity, CONSISTENCY_PASS_SCORE, FALLBACK_SCORE, QA_DIMENSIONS,
    QA_PASS_SCORE,
};
