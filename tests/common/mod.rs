//! 场景测试共用的脚本模型与流水线组装

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use fabula::application::ports::{InvokeOptions, ModelRole};
use fabula::application::{ApiError, ApiRetryPolicy, Concept, JobConfig, PipelineSettings};
use fabula::domain::content::Stage;
use fabula::infrastructure::adapters::{FileCheckpointStore, InMemoryLoreStore, ScriptedModelClient};
use fabula::infrastructure::worker::PipelineFactory;

/// 脚本模型每次返回的结构规模
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub books: usize,
    pub chapters: usize,
    pub scenes: usize,
    pub beats: usize,
    pub prose_words: usize,
}

impl Shape {
    pub fn new(books: usize, chapters: usize) -> Self {
        Self {
            books,
            chapters,
            scenes: 2,
            beats: 2,
            prose_words: 30,
        }
    }
}

pub const PROSE_LINE: &str = "\u{201c}Hold the line,\u{201d} Jón whispered. The café lights of Kōbe shimmered under the tide.";

pub fn concept() -> Concept {
    Concept {
        title: "Tidebound".to_string(),
        premise: "A drowned empire rises from the sea.".to_string(),
        genre: "Fantasy".to_string(),
    }
}

pub fn job_config(shape: Shape) -> JobConfig {
    JobConfig {
        concept: concept(),
        book_count: shape.books as u32,
        chapters_per_book: shape.chapters as u32,
        target_word_count: 30_000,
        scenes_per_chapter: shape.scenes as u32,
        preset: "balanced".to_string(),
        use_lore: true,
        resume_from: None,
    }
}

/// 小规模的流水线参数，节拍与正文范围包住脚本模型的输出
pub fn settings(stop_after: Option<Stage>) -> PipelineSettings {
    PipelineSettings {
        beats_min: 1,
        beats_max: 4,
        prose_words_min: 10,
        prose_words_max: 80,
        stop_after,
        ..PipelineSettings::default()
    }
}

pub fn series_json(books: usize) -> Value {
    json!({"series": {
        "title": "Tidebound",
        "logline": "The sea remembers.",
        "premise": "A drowned empire rises from the sea.",
        "genre": "Fantasy",
        "themes": ["memory", "sacrifice"],
        "books": (1..=books).map(|n| json!({
            "book_number": n,
            "title": format!("Book of Tides {}", n),
            "premise": format!("The tide turns for the {} time.", n),
        })).collect::<Vec<_>>(),
        "lore": {
            "characters": [{"name": "Mara", "role": "protagonist", "description": "A diver", "traits": ["stubborn"]}],
            "locations": [{"name": "Sunken Bell", "description": "A temple under the bay", "significance": "Origin of the tide"}],
            "world_elements": [{"name": "Tidecraft", "type": "magic", "description": "Water-binding", "rules": ["costs memories"]}]
        }
    }})
}

pub fn book_json(chapters: usize) -> Value {
    json!({
        "title": "Book of Tides",
        "premise": "The tide turns.",
        "act_structure": {
            "act_1": {"percentage": 25, "summary": "Setup"},
            "act_2a": {"percentage": 25, "summary": "Rising"},
            "act_2b": {"percentage": 25, "summary": "Fall"},
            "act_3": {"percentage": 25, "summary": "Resolution"}
        },
        "character_arcs": [{"character_name": "Mara", "starting_state": "afraid", "ending_state": "brave"}],
        "chapters": (1..=chapters).map(|n| json!({
            "chapter_number": n,
            "title": format!("Chapter {}", n),
            "purpose": format!("Advance the tide plot, step {}", n),
            "plot_points": ["Mara dives"],
            "setting": {"location": "The bay", "time": "Dusk", "atmosphere": "Cold"}
        })).collect::<Vec<_>>()
    })
}

pub fn chapter_json(scenes: usize) -> Value {
    json!({"scenes": (1..=scenes).map(|n| json!({
        "scene_number": n,
        "title": format!("Scene {}", n),
        "purpose": "Raise the stakes",
        "pov": "Mara",
        "setting": "The bay",
        "conflicts": [{"type": "external", "description": "The current pulls her down"}],
        "turning_points": ["The bell rings"]
    })).collect::<Vec<_>>()})
}

pub fn beats_json(beats: usize) -> Value {
    json!({"beats": (1..=beats).map(|n| json!({
        "beat_number": n,
        "description": format!("Mara reaches for the bell, moment {}", n),
        "emotional_tone": "tense",
        "character_actions": ["dives"],
        "dialogue_summary": "Jón warns her"
    })).collect::<Vec<_>>()})
}

/// 约 `words` 个词的正文，含对话与非 ASCII 字符
pub fn prose_text(words: usize) -> String {
    let mut out: Vec<&str> = PROSE_LINE.split_whitespace().collect();
    let filler = ["the", "water", "rose", "and", "fell", "again"];
    let mut i = 0;
    while out.len() < words {
        out.push(filler[i % filler.len()]);
        i += 1;
    }
    out.join(" ")
}

/// 全文加结构化段落，首段带完整的对白字段
pub fn prose_json(words: usize) -> Value {
    json!({
        "full_prose": prose_text(words),
        "paragraphs": [{
            "paragraph_number": 1,
            "type": "dialogue",
            "content": PROSE_LINE,
            "pov_character": "Mara",
            "dialogue_lines": [{
                "speaker": "Jón",
                "dialogue": "Hold the line,",
                "action": "whispered",
                "internal_thought": "Kōbe is lost."
            }]
        }]
    })
}

pub fn qa_json(overall: u8) -> Value {
    let passing = overall >= 7;
    let approval = if passing { "approved" } else { "needs_revision" };
    let major_issues: Vec<&str> = if passing {
        Vec::new()
    } else {
        vec!["Pacing collapses in the middle"]
    };
    json!({
        "scores": {
            "structure": overall, "pacing": overall, "character_arcs": overall,
            "theme_integration": overall, "consistency": overall, "overall": overall
        },
        "approval": approval,
        "major_issues": major_issues,
        "strengths": ["Vivid setting"],
        "revision_tasks": [],
        "reviewer_notes": "Reviewed"
    })
}

pub fn lore_json() -> Value {
    json!({
        "lore_violations": [],
        "new_lore_detected": [{"type": "faction", "name": "Bellwardens", "description": "Keepers of the bell", "should_add": true}],
        "consistency_score": 9,
        "approval": "approved",
        "notes": "Consistent"
    })
}

/// 对每个角色返回满足契约的输出；`qa_overall` 控制评审是否通过
pub fn responder(
    shape: Shape,
    qa_overall: u8,
) -> impl Fn(&str, &InvokeOptions) -> Result<String, ApiError> + Send + Sync + 'static {
    move |_prompt: &str, options: &InvokeOptions| {
        let value = match options.role {
            ModelRole::Series => series_json(shape.books),
            ModelRole::Book => book_json(shape.chapters),
            ModelRole::Chapter => chapter_json(shape.scenes),
            ModelRole::Scene | ModelRole::Beat => beats_json(shape.beats),
            ModelRole::Prose => prose_json(shape.prose_words),
            ModelRole::Qa => qa_json(qa_overall),
            ModelRole::Lore => lore_json(),
        };
        // 与真实模型一样包在代码块里
        Ok(format!("Here is the output:\n```json\n{}\n```", value))
    }
}

pub fn scripted(shape: Shape, qa_overall: u8) -> Arc<ScriptedModelClient> {
    Arc::new(ScriptedModelClient::with_responder(responder(shape, qa_overall)))
}

/// 零退避、带设定库的工厂
pub async fn factory(
    model: Arc<ScriptedModelClient>,
    dir: &Path,
    settings: PipelineSettings,
    max_retries: u32,
    gate_retries: u32,
) -> PipelineFactory {
    let checkpoints = FileCheckpointStore::new(dir).await.unwrap();
    PipelineFactory::new(model, Arc::new(checkpoints), "scripted-model")
        .with_lore(Arc::new(InMemoryLoreStore::default()), 5)
        .with_api_policy(ApiRetryPolicy::new(3, Duration::ZERO))
        .with_retries(max_retries, gate_retries)
        .with_base_settings(settings)
}
