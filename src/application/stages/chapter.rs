//! Chapter 阶段：章节 → 场景

use serde_json::{json, Value};

use crate::application::coerce::{Coercer, CoercionError, Fields};
use crate::application::contract::Contract;
use crate::domain::content::{Book, Chapter, Conflict, Scene, Series};

use super::book::parse_setting;

/// 章节场景计划
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterPlan {
    pub scenes: Vec<Scene>,
}

/// 场景数量范围：`[max(1, target-1), target+2]`
pub fn scene_range(target: usize) -> (usize, usize) {
    (target.saturating_sub(1).max(1), target + 2)
}

pub fn contract(scenes_per_chapter: usize, planned_words: u32, tolerance_pct: u32) -> Contract<ChapterPlan> {
    let (min, max) = scene_range(scenes_per_chapter);
    Contract::<ChapterPlan>::new()
        .range("scenes", "scene", min, Some(max), |p| p.scenes.len())
        .range_each("conflicts", "scene", "conflict", 1, None, |p| {
            p.scenes.iter().map(|s| s.conflicts.len()).collect()
        })
        .range_each("turning_points", "scene", "turning point", 1, None, |p| {
            p.scenes.iter().map(|s| s.turning_points.len()).collect()
        })
        .tolerance(
            "scene planned word counts",
            planned_words,
            tolerance_pct,
            |p| p.scenes.iter().map(|s| s.planned_word_count).collect(),
            |p, corrected| {
                for (scene, value) in p.scenes.iter_mut().zip(corrected) {
                    scene.planned_word_count = *value;
                }
            },
        )
}

/// 解析场景计划；缺失的场景字数按章节计划字数平均分配
pub fn parse(value: &Value, planned_words: u32) -> Result<ChapterPlan, Vec<CoercionError>> {
    let coercer = Coercer::new();
    let Some(root) = coercer.object("", value) else {
        return Err(coercer.into_errors());
    };
    let items = root.req_items("scenes");
    let per_scene = if items.is_empty() {
        0
    } else {
        planned_words / items.len() as u32
    };

    let scenes = items
        .iter()
        .enumerate()
        .map(|(index, s)| Scene {
            scene_number: s.uint_or("scene_number", index as u32 + 1),
            title: s.string_or("title", ""),
            purpose: s.string_or("purpose", ""),
            scene_type: s.string_or("scene_type", ""),
            pov: s.string_or("pov", ""),
            setting: parse_setting(s),
            characters_present: s.strings("characters_present"),
            conflicts: parse_conflicts(s),
            turning_points: s.strings("turning_points"),
            planned_word_count: s.uint_or("planned_word_count", per_scene),
            actual_word_count: 0,
            beats: Vec::new(),
        })
        .collect();
    coercer.finish(ChapterPlan { scenes })
}

/// 冲突可以是 `{type, description}` 对象或纯描述字符串
fn parse_conflicts(fields: &Fields<'_>) -> Vec<Conflict> {
    let Some(Value::Array(items)) = fields.raw("conflicts") else {
        return match fields.opt_string("conflicts") {
            Some(description) => vec![Conflict {
                conflict_type: "general".to_string(),
                description,
            }],
            None => Vec::new(),
        };
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(description) => Some(Conflict {
                conflict_type: "general".to_string(),
                description: description.clone(),
            }),
            Value::Object(map) => Some(Conflict {
                conflict_type: map
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("general")
                    .to_string(),
                description: map
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            _ => None,
        })
        .collect()
}

pub fn context(series: &Series, book: &Book, chapter: &Chapter) -> String {
    let neighbours: Vec<Value> = book
        .chapters
        .iter()
        .filter(|c| c.chapter_number + 1 >= chapter.chapter_number && c.chapter_number <= chapter.chapter_number + 1)
        .filter(|c| c.chapter_number != chapter.chapter_number)
        .map(|c| json!({"chapter_number": c.chapter_number, "title": c.title, "purpose": c.purpose}))
        .collect();

    let view = json!({
        "series": {"title": series.title, "genre": series.genre, "themes": series.themes},
        "book": {"book_number": book.book_number, "title": book.title, "premise": book.premise},
        "chapter": {
            "chapter_number": chapter.chapter_number,
            "title": chapter.title,
            "act": chapter.act,
            "purpose": chapter.purpose,
            "plot_points": chapter.plot_points,
            "character_focus": chapter.character_focus,
            "setting": chapter.setting,
            "planned_word_count": chapter.planned_word_count,
        },
        "adjacent_chapters": neighbours,
    });
    serde_json::to_string_pretty(&view).unwrap_or_else(|_| view.to_string())
}

/// 写入场景并重新编号
pub fn apply(chapter: &mut Chapter, plan: ChapterPlan) {
    chapter.scenes = plan
        .scenes
        .into_iter()
        .enumerate()
        .map(|(index, mut scene)| {
            scene.scene_number = index as u32 + 1;
            scene
        })
        .collect();
}
