//! Content Context - Value Objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// 生成阶段
///
/// 六个级联阶段，严格按顺序执行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Series,
    Book,
    Chapter,
    Scene,
    Beat,
    Prose,
}

impl Stage {
    /// 全部阶段（执行顺序）
    pub const ALL: [Stage; 6] = [
        Stage::Series,
        Stage::Book,
        Stage::Chapter,
        Stage::Scene,
        Stage::Beat,
        Stage::Prose,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Series => "series",
            Stage::Book => "book",
            Stage::Chapter => "chapter",
            Stage::Scene => "scene",
            Stage::Beat => "beat",
            Stage::Prose => "prose",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "series" => Some(Stage::Series),
            "book" => Some(Stage::Book),
            "chapter" => Some(Stage::Chapter),
            "scene" => Some(Stage::Scene),
            "beat" => Some(Stage::Beat),
            "prose" => Some(Stage::Prose),
            _ => None,
        }
    }

    /// 阶段序号（从 0 开始）
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    /// 指定阶段之后的所有阶段
    ///
    /// `None` 表示从头开始
    pub fn after(completed: Option<Stage>) -> &'static [Stage] {
        match completed {
            None => &Self::ALL,
            Some(stage) => &Self::ALL[stage.index() + 1..],
        }
    }

    /// 完成该阶段后的进度百分比
    pub fn progress_percent(&self) -> u8 {
        (((self.index() + 1) * 100) / Self::ALL.len()) as u8
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 书籍状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    #[default]
    Planned,
    Outlined,
    Drafted,
    Complete,
}

/// 章节状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    #[default]
    Planned,
    Drafted,
    Revised,
    Final,
}

/// 正文状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProseStatus {
    #[default]
    Draft,
    Revised,
    Final,
}

/// 段落类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphType {
    #[default]
    Narrative,
    Dialogue,
    Mixed,
    Description,
    Action,
    InternalMonologue,
}

impl ParagraphType {
    /// 宽松解析（模型输出可能使用连字符或大小写变体）
    pub fn from_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "narrative" => Some(Self::Narrative),
            "dialogue" => Some(Self::Dialogue),
            "mixed" => Some(Self::Mixed),
            "description" => Some(Self::Description),
            "action" => Some(Self::Action),
            "internal_monologue" => Some(Self::InternalMonologue),
            _ => None,
        }
    }
}

/// 项目整体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Draft,
    InReview,
    Approved,
    NeedsRevision,
}

/// 场景/章节设定
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Setting {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub atmosphere: String,
}

/// 场景冲突
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub conflict_type: String,
    pub description: String,
}

/// 统计文本词数（按空白分隔）
pub fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}
