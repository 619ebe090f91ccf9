//! Prose 阶段：节拍 → 正文
//!
//! 每个节拍单独生成；上一节拍正文的末尾 200 词作为衔接上下文。

use serde_json::{json, Value};

use crate::application::coerce::{Coercer, CoercionError, Fields};
use crate::application::contract::Contract;
use crate::domain::content::{
    word_count, Beat, Chapter, DialogueLine, Paragraph, ParagraphType, Prose, Scene,
};

/// 衔接上下文的词数
pub const CONTINUITY_WORDS: usize = 200;

/// 单个节拍的正文
#[derive(Debug, Clone, PartialEq)]
pub struct ProseDraft {
    pub content: String,
    pub paragraphs: Vec<Paragraph>,
}

impl ProseDraft {
    pub fn word_count(&self) -> u32 {
        word_count(&self.content)
    }
}

pub fn contract(words_min: usize, words_max: usize) -> Contract<ProseDraft> {
    Contract::<ProseDraft>::new().range("prose", "word", words_min, Some(words_max), |d| {
        d.word_count() as usize
    })
}

/// 正文字段依次尝试 `full_prose` / `content` / `prose` / `text`；
/// 都缺失时由段落拼接
pub fn parse(value: &Value) -> Result<ProseDraft, Vec<CoercionError>> {
    let coercer = Coercer::new();
    let Some(root) = coercer.object("", value) else {
        return Err(coercer.into_errors());
    };

    let paragraphs: Vec<Paragraph> = root
        .items("paragraphs")
        .iter()
        .enumerate()
        .map(|(index, p)| parse_paragraph(p, index as u32 + 1))
        .filter(|p| !p.content.trim().is_empty())
        .collect();

    let content = ["full_prose", "content", "prose", "text"]
        .iter()
        .find_map(|key| root.opt_string(key))
        .filter(|c| !c.trim().is_empty());

    let draft = match content {
        Some(content) if paragraphs.is_empty() => ProseDraft {
            paragraphs: split_paragraphs(&content),
            content,
        },
        Some(content) => ProseDraft { content, paragraphs },
        None if !paragraphs.is_empty() => ProseDraft {
            content: paragraphs
                .iter()
                .map(|p| p.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            paragraphs,
        },
        None => {
            coercer.push("full_prose", "missing required field");
            ProseDraft {
                content: String::new(),
                paragraphs: Vec::new(),
            }
        }
    };
    coercer.finish(draft)
}

fn parse_paragraph(p: &Fields<'_>, position: u32) -> Paragraph {
    let content = p.string_or("content", "");
    let paragraph_type = p
        .opt_string("type")
        .or_else(|| p.opt_string("paragraph_type"))
        .and_then(|t| ParagraphType::from_loose(&t))
        .unwrap_or_default();

    let dialogue_lines = p
        .items("dialogue_lines")
        .iter()
        .map(|d| DialogueLine {
            speaker: d.string_or("speaker", ""),
            dialogue: d
                .opt_string("dialogue")
                .or_else(|| d.opt_string("line"))
                .unwrap_or_default(),
            action: d.opt_string("action"),
            internal_thought: d.opt_string("internal_thought"),
        })
        .collect();

    Paragraph {
        paragraph_number: p.uint_or("paragraph_number", position),
        paragraph_type,
        word_count: word_count(&content),
        content,
        dialogue_lines,
        pov_character: p.opt_string("pov_character"),
    }
}

/// 没有段落结构时按空行切分
fn split_paragraphs(content: &str) -> Vec<Paragraph> {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .enumerate()
        .map(|(index, block)| Paragraph {
            paragraph_number: index as u32 + 1,
            paragraph_type: ParagraphType::Narrative,
            content: block.to_string(),
            dialogue_lines: Vec::new(),
            pov_character: None,
            word_count: word_count(block),
        })
        .collect()
}

pub fn context(chapter: &Chapter, scene: &Scene, beat: &Beat, previous: Option<&str>) -> String {
    let view = json!({
        "chapter": {"chapter_number": chapter.chapter_number, "title": chapter.title},
        "scene": {
            "scene_number": scene.scene_number,
            "title": scene.title,
            "pov": scene.pov,
            "setting": scene.setting,
            "characters_present": scene.characters_present,
        },
        "beat": {
            "beat_number": beat.beat_number,
            "description": beat.description,
            "emotional_tone": beat.emotional_tone,
            "character_actions": beat.character_actions,
            "dialogue_summary": beat.dialogue_summary,
        },
    });
    let body = serde_json::to_string_pretty(&view).unwrap_or_else(|_| view.to_string());
    match previous.filter(|p| !p.is_empty()) {
        Some(previous) => format!("{}\n\nPrevious passage:\n{}", body, previous),
        None => body,
    }
}

/// 写入正文；重新生成时草稿版本递增
pub fn apply(beat: &mut Beat, draft: ProseDraft) {
    let version = beat.prose.as_ref().map(|p| p.draft_version + 1).unwrap_or(1);
    let mut prose = Prose::new(draft.content, draft.paragraphs);
    prose.draft_version = version;
    beat.prose = Some(prose);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["tide"; n].join(" ")
    }

    #[test]
    fn test_word_range() {
        let c = contract(200, 500);
        let short = parse(&json!({"full_prose": words(150)})).unwrap();
        let violations = c.evaluate(&short);
        assert_eq!(
            violations[0].message,
            "Prose is TOO SHORT: 150 words, required 200-500. Add at least 50 more words."
        );
        let ok = parse(&json!({"full_prose": words(200)})).unwrap();
        assert!(c.evaluate(&ok).is_empty());
    }

    #[test]
    fn test_paragraphs_with_dialogue() {
        let value = json!({
            "full_prose": "Mara ran.\n\n\"Wait!\" Jon called.",
            "paragraphs": [
                {"paragraph_number": 1, "type": "action", "content": "Mara ran."},
                {"paragraph_number": 2, "type": "Internal-Monologue", "content": "\"Wait!\" Jon called.",
                 "dialogue_lines": [{"speaker": "Jon", "line": "Wait!", "action": "called"}]}
            ]
        });
        let draft = parse(&value).unwrap();
        assert_eq!(draft.paragraphs.len(), 2);
        assert_eq!(draft.paragraphs[0].paragraph_type, ParagraphType::Action);
        assert_eq!(draft.paragraphs[1].paragraph_type, ParagraphType::InternalMonologue);
        assert_eq!(draft.paragraphs[1].dialogue_lines[0].dialogue, "Wait!");
        assert_eq!(draft.paragraphs[1].word_count, 3);
    }

    #[test]
    fn test_content_split_when_paragraphs_missing() {
        let draft = parse(&json!({"content": "First block.\n\n\n\nSecond block here."})).unwrap();
        assert_eq!(draft.paragraphs.len(), 2);
        assert_eq!(draft.paragraphs[1].word_count, 3);
    }

    #[test]
    fn test_content_from_paragraphs() {
        let draft = parse(&json!({"paragraphs": [{"content": "One."}, {"content": "Two."}]})).unwrap();
        assert_eq!(draft.content, "One.\n\nTwo.");
    }

    #[test]
    fn test_missing_prose() {
        let errors = parse(&json!({"notes": "none"})).unwrap_err();
        assert_eq!(errors[0].path, "full_prose");
    }

    #[test]
    fn test_apply_bumps_version() {
        let mut beat = Beat {
            beat_number: 1,
            description: "d".to_string(),
            emotional_tone: String::new(),
            character_actions: Vec::new(),
            dialogue_summary: String::new(),
            prose: None,
        };
        apply(&mut beat, parse(&json!({"full_prose": words(10)})).unwrap());
        assert_eq!(beat.prose.as_ref().unwrap().draft_version, 1);
        assert_eq!(beat.prose.as_ref().unwrap().word_count, 10);
        apply(&mut beat, parse(&json!({"full_prose": words(12)})).unwrap());
        assert_eq!(beat.prose.as_ref().unwrap().draft_version, 2);
    }
}
