//! Content Context - 内容树限界上下文
//!
//! 职责:
//! - Project 聚合（元数据 + 内容树 + 评审历史 + 修订历史）
//! - Series → Book → Chapter → Scene → Beat → Prose 层级
//! - 设定库（Lore）的追加与去重
//! - 字数自底向上汇总

mod aggregate;
mod entities;
mod lore;
mod value_objects;

pub use aggregate::{Metadata, Project, RevisionEntry, SCHEMA_VERSION};
pub use entities::{
    ActStructure, Beat, Book, Chapter, CharacterArc, CharacterFocus, DialogueLine, Paragraph,
    Prose, Scene, Series,
};
pub use lore::{Character, Location, Lore, LoreElement, WorldElement};
pub use value_objects::{
    word_count, BookStatus, ChapterStatus, Conflict, ParagraphType, ProjectStatus, ProseStatus,
    Setting, Stage,
};
