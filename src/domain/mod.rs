//! Domain Layer - 领域层
//!
//! - content: 内容树（系列 → 书 → 章 → 场景 → 节拍 → 正文）与设定
//! - assessment: 质量审查与一致性报告

pub mod assessment;
pub mod content;
