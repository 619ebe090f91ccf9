//! Book 阶段：书目 → 幕结构 + 角色弧光 + 章节大纲

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::application::coerce::{Coercer, CoercionError, Fields};
use crate::application::contract::Contract;
use crate::domain::content::{
    ActStructure, Book, BookStatus, Chapter, ChapterStatus, CharacterArc, CharacterFocus, Series,
    Setting,
};

/// 书籍大纲
#[derive(Debug, Clone, PartialEq)]
pub struct BookOutline {
    pub title: Option<String>,
    pub premise: Option<String>,
    pub act_structure: BTreeMap<String, ActStructure>,
    pub character_arcs: Vec<CharacterArc>,
    pub chapters: Vec<Chapter>,
}

pub fn contract(chapters_per_book: usize) -> Contract<BookOutline> {
    Contract::<BookOutline>::new()
        .exact("chapters", "chapter", chapters_per_book, |o| o.chapters.len())
        .tolerance(
            "act percentages",
            100,
            0,
            |o| o.act_structure.values().map(|a| a.percentage).collect(),
            |o, corrected| {
                for (act, value) in o.act_structure.values_mut().zip(corrected) {
                    act.percentage = *value;
                }
            },
        )
}

pub fn parse(value: &Value) -> Result<BookOutline, Vec<CoercionError>> {
    let coercer = Coercer::new();
    let Some(root) = coercer.object("", value) else {
        return Err(coercer.into_errors());
    };
    let root = root.child("book").unwrap_or(root);

    let act_structure = match root.child("act_structure") {
        Some(acts) => acts
            .entries()
            .filter_map(|(key, _)| {
                acts.child(key).map(|act| {
                    (
                        key.clone(),
                        ActStructure {
                            percentage: act.req_uint("percentage").unwrap_or(0),
                            word_target: act.uint_or("word_target", 0),
                            summary: act.string_or("summary", ""),
                            key_events: act.strings("key_events"),
                            ending_hook: act.string_or("ending_hook", ""),
                        },
                    )
                })
            })
            .collect(),
        None => BTreeMap::new(),
    };

    let character_arcs = root
        .items("character_arcs")
        .iter()
        .map(|arc| CharacterArc {
            character_name: arc.string("character_name"),
            starting_state: arc.string_or("starting_state", ""),
            ending_state: arc.string_or("ending_state", ""),
            transformation: arc.string_or("transformation", ""),
            key_moments: arc.strings("key_moments"),
        })
        .collect();

    let chapters = root
        .req_items("chapters")
        .iter()
        .enumerate()
        .map(|(index, c)| parse_chapter(c, index as u32 + 1))
        .collect();

    let outline = BookOutline {
        title: root.opt_string("title"),
        premise: root.opt_string("premise"),
        act_structure,
        character_arcs,
        chapters,
    };
    coercer.finish(outline)
}

fn parse_chapter(c: &Fields<'_>, position: u32) -> Chapter {
    let character_focus = match c.child("character_focus") {
        Some(focus) => CharacterFocus {
            pov: focus.string_or("pov", ""),
            present: focus.strings("present"),
            arc_moments: focus.strings("arc_moments"),
        },
        None => CharacterFocus {
            pov: c.string_or("pov", ""),
            ..Default::default()
        },
    };

    Chapter {
        chapter_number: c.uint_or("chapter_number", position),
        title: c.string_or("title", ""),
        act: c.uint_or("act", 1),
        purpose: c.string("purpose"),
        plot_points: c.strings("plot_points"),
        character_focus,
        setting: parse_setting(c),
        planned_word_count: c.uint_or("planned_word_count", 0),
        actual_word_count: 0,
        status: ChapterStatus::Planned,
        scenes: Vec::new(),
    }
}

/// 设定字段可能是对象，也可能只是地点字符串
pub(crate) fn parse_setting(fields: &Fields<'_>) -> Setting {
    match fields.raw("setting") {
        Some(Value::String(location)) => Setting {
            location: location.clone(),
            ..Default::default()
        },
        Some(_) => match fields.child("setting") {
            Some(s) => Setting {
                location: s.string_or("location", ""),
                time: s.string_or("time", ""),
                atmosphere: s.string_or("atmosphere", ""),
            },
            None => Setting::default(),
        },
        None => Setting::default(),
    }
}

pub fn context(series: &Series, book: &Book, chapters_per_book: usize) -> String {
    let previous: Vec<Value> = series
        .books
        .iter()
        .filter(|b| b.book_number < book.book_number)
        .map(|b| {
            json!({
                "book_number": b.book_number,
                "title": b.title,
                "premise": b.premise,
                "ending": b.act_structure.values().last().map(|a| a.ending_hook.clone()),
            })
        })
        .collect();

    let view = json!({
        "series": {
            "title": series.title,
            "premise": series.premise,
            "genre": series.genre,
            "themes": series.themes,
            "persistent_threads": series.persistent_threads,
            "escalation_model": series.escalation_model,
        },
        "book": {
            "book_number": book.book_number,
            "title": book.title,
            "premise": book.premise,
            "protagonist_goal": book.protagonist_goal,
            "antagonistic_force": book.antagonistic_force,
            "themes": book.themes,
            "target_word_count": book.target_word_count,
        },
        "previous_books": previous,
        "required_chapters": chapters_per_book,
    });
    serde_json::to_string_pretty(&view).unwrap_or_else(|_| view.to_string())
}

/// 写入书籍：章节重新编号，缺失的计划字数取平均值，幕字数目标按百分比计算
pub fn apply(book: &mut Book, outline: BookOutline, chapters_per_book: u32) {
    if let Some(title) = outline.title.filter(|t| !t.trim().is_empty()) {
        book.title = title;
    }
    if let Some(premise) = outline.premise.filter(|p| !p.trim().is_empty()) {
        book.premise = premise;
    }

    let target = book.target_word_count;
    book.act_structure = outline.act_structure;
    for act in book.act_structure.values_mut() {
        act.word_target = target * act.percentage / 100;
    }
    book.character_arcs = outline.character_arcs;

    let per_chapter = if chapters_per_book > 0 {
        target / chapters_per_book
    } else {
        0
    };
    book.chapters = outline
        .chapters
        .into_iter()
        .enumerate()
        .map(|(index, mut chapter)| {
            chapter.chapter_number = index as u32 + 1;
            if chapter.planned_word_count == 0 {
                chapter.planned_word_count = per_chapter;
            }
            chapter
        })
        .collect();
    book.status = BookStatus::Outlined;
}

/// 质量门评审用摘要
pub fn summary(book: &Book) -> Value {
    json!({
        "book_number": book.book_number,
        "title": book.title,
        "premise": book.premise,
        "protagonist_goal": book.protagonist_goal,
        "antagonistic_force": book.antagonistic_force,
        "act_structure": book.act_structure,
        "character_arcs": book.character_arcs,
        "chapters": book.chapters.iter().map(|c| json!({
            "chapter_number": c.chapter_number,
            "title": c.title,
            "act": c.act,
            "purpose": c.purpose,
            "plot_points": c.plot_points,
            "pov": c.character_focus.pov,
        })).collect::<Vec<_>>(),
    })
}

/// 恢复到大纲之前的状态（质量门重新生成前调用）
pub fn reset(book: &mut Book) {
    book.act_structure.clear();
    book.character_arcs.clear();
    book.chapters.clear();
    book.status = BookStatus::Planned;
}
