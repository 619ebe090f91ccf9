//! Content Context - Entities
//!
//! 内容树节点：Series → Book → Chapter → Scene → Beat → Prose
//!
//! 所有可选字段都带 `#[serde(default)]`，加载旧快照时缺失字段取默认值，
//! 未知字段被忽略。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::lore::Lore;
use super::value_objects::{
    word_count, BookStatus, ChapterStatus, Conflict, ParagraphType, ProseStatus, Setting,
};

/// 系列（内容树根节点）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub title: String,
    #[serde(default)]
    pub logline: Option<String>,
    pub premise: String,
    pub genre: String,
    #[serde(default)]
    pub subgenres: Vec<String>,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub persistent_threads: Vec<serde_json::Value>,
    #[serde(default)]
    pub escalation_model: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub lore: Lore,
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub style_guide: Option<String>,
}

impl Series {
    /// 从概念创建空系列
    pub fn from_concept(
        title: impl Into<String>,
        premise: impl Into<String>,
        genre: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            logline: None,
            premise: premise.into(),
            genre: genre.into(),
            subgenres: Vec::new(),
            target_audience: String::new(),
            themes: Vec::new(),
            persistent_threads: Vec::new(),
            escalation_model: serde_json::Map::new(),
            lore: Lore::default(),
            books: Vec::new(),
            style_guide: None,
        }
    }

    pub fn book(&self, book_number: u32) -> Option<&Book> {
        self.books.iter().find(|b| b.book_number == book_number)
    }

    pub fn book_mut(&mut self, book_number: u32) -> Option<&mut Book> {
        self.books.iter_mut().find(|b| b.book_number == book_number)
    }

    /// 自底向上汇总字数：Beat.Prose → Scene → Chapter → Book
    pub fn rollup_word_counts(&mut self) {
        for book in &mut self.books {
            book.rollup_word_counts();
        }
    }

    /// 全部正文字数
    pub fn total_word_count(&self) -> u32 {
        self.books.iter().map(|b| b.current_word_count).sum()
    }

    /// 检查编号连续性，返回所有问题描述
    pub fn numbering_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        check_sequence(
            "books",
            self.books.iter().map(|b| b.book_number),
            &mut issues,
        );
        for book in &self.books {
            let path = format!("book {}", book.book_number);
            check_sequence(
                &format!("{} chapters", path),
                book.chapters.iter().map(|c| c.chapter_number),
                &mut issues,
            );
            for chapter in &book.chapters {
                let path = format!("{} chapter {}", path, chapter.chapter_number);
                check_sequence(
                    &format!("{} scenes", path),
                    chapter.scenes.iter().map(|s| s.scene_number),
                    &mut issues,
                );
                for scene in &chapter.scenes {
                    check_sequence(
                        &format!("{} scene {} beats", path, scene.scene_number),
                        scene.beats.iter().map(|b| b.beat_number),
                        &mut issues,
                    );
                }
            }
        }
        issues
    }
}

fn check_sequence(label: &str, numbers: impl Iterator<Item = u32>, issues: &mut Vec<String>) {
    for (index, number) in numbers.enumerate() {
        let expected = index as u32 + 1;
        if number != expected {
            issues.push(format!(
                "{}: expected number {} at position {}, found {}",
                label, expected, index, number
            ));
            return;
        }
    }
}

/// 书籍
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub book_number: u32,
    #[serde(default)]
    pub title: String,
    pub premise: String,
    #[serde(default)]
    pub protagonist_goal: Option<String>,
    #[serde(default)]
    pub antagonistic_force: Option<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default = "default_book_target")]
    pub target_word_count: u32,
    #[serde(default)]
    pub current_word_count: u32,
    #[serde(default)]
    pub status: BookStatus,
    /// 幕结构（act_1, act_2a, act_2b, act_3），百分比之和为 100
    #[serde(default)]
    pub act_structure: BTreeMap<String, ActStructure>,
    #[serde(default)]
    pub character_arcs: Vec<CharacterArc>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

fn default_book_target() -> u32 {
    100_000
}

impl Book {
    pub fn chapter(&self, chapter_number: u32) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.chapter_number == chapter_number)
    }

    pub fn rollup_word_counts(&mut self) {
        for chapter in &mut self.chapters {
            chapter.rollup_word_counts();
        }
        self.current_word_count = self.chapters.iter().map(|c| c.actual_word_count).sum();
    }

    /// 幕百分比之和
    pub fn act_percentage_total(&self) -> u32 {
        self.act_structure.values().map(|a| a.percentage).sum()
    }
}

/// 幕结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActStructure {
    pub percentage: u32,
    #[serde(default)]
    pub word_target: u32,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_events: Vec<String>,
    #[serde(default)]
    pub ending_hook: String,
}

/// 角色弧光
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterArc {
    pub character_name: String,
    #[serde(default)]
    pub starting_state: String,
    #[serde(default)]
    pub ending_state: String,
    #[serde(default)]
    pub transformation: String,
    #[serde(default)]
    pub key_moments: Vec<String>,
}

/// 章节视角与出场角色
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CharacterFocus {
    #[serde(default)]
    pub pov: String,
    #[serde(default)]
    pub present: Vec<String>,
    #[serde(default)]
    pub arc_moments: Vec<String>,
}

/// 章节
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub chapter_number: u32,
    #[serde(default)]
    pub title: String,
    /// 所属幕编号
    #[serde(default)]
    pub act: u32,
    pub purpose: String,
    #[serde(default)]
    pub plot_points: Vec<String>,
    #[serde(default)]
    pub character_focus: CharacterFocus,
    #[serde(default)]
    pub setting: Setting,
    #[serde(default)]
    pub planned_word_count: u32,
    #[serde(default)]
    pub actual_word_count: u32,
    #[serde(default)]
    pub status: ChapterStatus,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

impl Chapter {
    pub fn rollup_word_counts(&mut self) {
        for scene in &mut self.scenes {
            scene.rollup_word_counts();
        }
        self.actual_word_count = self.scenes.iter().map(|s| s.actual_word_count).sum();
    }

    pub fn planned_scene_total(&self) -> u32 {
        self.scenes.iter().map(|s| s.planned_word_count).sum()
    }
}

/// 场景
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub scene_number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub scene_type: String,
    #[serde(default)]
    pub pov: String,
    #[serde(default)]
    pub setting: Setting,
    #[serde(default)]
    pub characters_present: Vec<String>,
    /// 至少一个
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    /// 至少一个
    #[serde(default)]
    pub turning_points: Vec<String>,
    #[serde(default)]
    pub planned_word_count: u32,
    #[serde(default)]
    pub actual_word_count: u32,
    #[serde(default)]
    pub beats: Vec<Beat>,
}

impl Scene {
    pub fn rollup_word_counts(&mut self) {
        self.actual_word_count = self
            .beats
            .iter()
            .filter_map(|b| b.prose.as_ref())
            .map(|p| p.word_count)
            .sum();
    }
}

/// 节拍（最小叙事单元）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    pub beat_number: u32,
    pub description: String,
    #[serde(default)]
    pub emotional_tone: String,
    #[serde(default)]
    pub character_actions: Vec<String>,
    #[serde(default)]
    pub dialogue_summary: String,
    #[serde(default)]
    pub prose: Option<Prose>,
}

/// 正文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prose {
    #[serde(default = "default_draft_version")]
    pub draft_version: u32,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ProseStatus,
}

fn default_draft_version() -> u32 {
    1
}

impl Prose {
    /// 由全文与段落构建，字数按全文重新计算
    pub fn new(content: String, paragraphs: Vec<Paragraph>) -> Self {
        let word_count = word_count(&content);
        Self {
            draft_version: 1,
            content,
            paragraphs,
            word_count,
            generated_at: Some(Utc::now()),
            status: ProseStatus::Draft,
        }
    }

    /// 最后 `n` 个词（用于下一节拍的衔接上下文）
    pub fn tail_words(&self, n: usize) -> String {
        let words: Vec<&str> = self.content.split_whitespace().collect();
        let start = words.len().saturating_sub(n);
        words[start..].join(" ")
    }
}

/// 段落
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub paragraph_number: u32,
    #[serde(default)]
    pub paragraph_type: ParagraphType,
    pub content: String,
    #[serde(default)]
    pub dialogue_lines: Vec<DialogueLine>,
    #[serde(default)]
    pub pov_character: Option<String>,
    #[serde(default)]
    pub word_count: u32,
}

/// 对白
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub speaker: String,
    #[serde(alias = "line")]
    pub dialogue: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub internal_thought: Option<String>,
}
