//! Series 阶段：概念 → 系列设定 + 书目

use serde_json::{json, Value};

use crate::application::coerce::{Coercer, CoercionError, Fields};
use crate::application::contract::Contract;
use crate::domain::content::{
    Book, Character, Location, Lore, LoreElement, Series, WorldElement,
};

/// 系列阶段输出
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesDraft {
    pub title: Option<String>,
    pub logline: Option<String>,
    pub premise: Option<String>,
    pub genre: Option<String>,
    pub subgenres: Vec<String>,
    pub target_audience: String,
    pub themes: Vec<String>,
    pub persistent_threads: Vec<Value>,
    pub escalation_model: serde_json::Map<String, Value>,
    pub books: Vec<BookSeed>,
    pub lore: Lore,
    pub style_guide: Option<String>,
}

/// 书目种子（Book 阶段再展开）
#[derive(Debug, Clone, PartialEq)]
pub struct BookSeed {
    pub title: String,
    pub premise: String,
    pub protagonist_goal: Option<String>,
    pub antagonistic_force: Option<String>,
    pub themes: Vec<String>,
}

pub fn contract(book_count: usize) -> Contract<SeriesDraft> {
    Contract::<SeriesDraft>::new().exact("books", "book", book_count, |d| d.books.len())
}

/// 解析输出；接受 `{"series": {...}}` 包裹或直接的系列对象
pub fn parse(value: &Value) -> Result<SeriesDraft, Vec<CoercionError>> {
    let coercer = Coercer::new();
    let Some(root) = coercer.object("", value) else {
        return Err(coercer.into_errors());
    };
    let series = root.child("series").unwrap_or(root);

    let books = series
        .req_items("books")
        .iter()
        .map(|b| BookSeed {
            title: b.string("title"),
            premise: b.string("premise"),
            protagonist_goal: b.opt_string("protagonist_goal"),
            antagonistic_force: b.opt_string("antagonistic_force"),
            themes: b.strings("themes"),
        })
        .collect();

    // 设定可能在 lore 下，也可能直接放在系列对象上
    let lore = match series.child("lore") {
        Some(lore) => parse_lore(&lore),
        None => parse_lore(&series),
    };

    let draft = SeriesDraft {
        title: series.opt_string("title"),
        logline: series.opt_string("logline"),
        premise: series.opt_string("premise"),
        genre: series.opt_string("genre"),
        subgenres: series.strings("subgenres"),
        target_audience: series.string_or("target_audience", ""),
        themes: series.strings("themes"),
        persistent_threads: series.values("persistent_threads"),
        escalation_model: series.object_map("escalation_model"),
        books,
        lore,
        style_guide: series.opt_string("style_guide"),
    };
    coercer.finish(draft)
}

fn parse_lore(fields: &Fields<'_>) -> Lore {
    Lore {
        characters: fields
            .items("characters")
            .iter()
            .map(|c| Character {
                name: c.string("name"),
                role: c.string_or("role", "supporting"),
                description: c.string_or("description", ""),
                traits: c.strings("traits"),
                relationships: c.values("relationships"),
            })
            .collect(),
        locations: fields
            .items("locations")
            .iter()
            .map(|l| Location {
                name: l.string("name"),
                description: l.string_or("description", ""),
                significance: l.string_or("significance", ""),
            })
            .collect(),
        world_elements: fields
            .items("world_elements")
            .iter()
            .map(|w| WorldElement {
                name: w.string("name"),
                element_type: w.string_or("type", "other"),
                description: w.string_or("description", ""),
                rules: w.strings("rules"),
            })
            .collect(),
    }
}

pub fn context(series: &Series, book_count: usize, target_word_count: u32) -> String {
    format!(
        "Title: {}\nPremise: {}\nGenre: {}\nNumber of books: {}\nTarget words per book: {}",
        series.title, series.premise, series.genre, book_count, target_word_count
    )
}

/// 写入内容树；书目按顺序重新编号
pub fn apply(series: &mut Series, draft: SeriesDraft, target_word_count: u32) {
    fn non_empty(value: Option<String>) -> Option<String> {
        value.filter(|v| !v.trim().is_empty())
    }

    if let Some(title) = non_empty(draft.title) {
        series.title = title;
    }
    if let Some(premise) = non_empty(draft.premise) {
        series.premise = premise;
    }
    if let Some(genre) = non_empty(draft.genre) {
        series.genre = genre;
    }
    series.logline = non_empty(draft.logline);
    series.subgenres = draft.subgenres;
    series.target_audience = draft.target_audience;
    series.themes = draft.themes;
    series.persistent_threads = draft.persistent_threads;
    series.escalation_model = draft.escalation_model;
    series.style_guide = non_empty(draft.style_guide);

    let mut lore = Lore::default();
    lore.merge(
        draft
            .lore
            .characters
            .into_iter()
            .map(LoreElement::Character)
            .chain(
                draft
                    .lore
                    .locations
                    .into_iter()
                    .map(LoreElement::Location),
            )
            .chain(
                draft
                    .lore
                    .world_elements
                    .into_iter()
                    .map(LoreElement::WorldElement),
            ),
    );
    series.lore = lore;

    series.books = draft
        .books
        .into_iter()
        .enumerate()
        .map(|(index, seed)| Book {
            book_number: index as u32 + 1,
            title: seed.title,
            premise: seed.premise,
            protagonist_goal: seed.protagonist_goal,
            antagonistic_force: seed.antagonistic_force,
            themes: seed.themes,
            target_word_count,
            current_word_count: 0,
            status: Default::default(),
            act_structure: Default::default(),
            character_arcs: Vec::new(),
            chapters: Vec::new(),
        })
        .collect();
}

/// 质量门评审用摘要
pub fn summary(series: &Series) -> Value {
    json!({
        "title": series.title,
        "logline": series.logline,
        "premise": series.premise,
        "genre": series.genre,
        "themes": series.themes,
        "persistent_threads": series.persistent_threads,
        "escalation_model": series.escalation_model,
        "books": series.books.iter().map(|b| json!({
            "book_number": b.book_number,
            "title": b.title,
            "premise": b.premise,
            "protagonist_goal": b.protagonist_goal,
            "antagonistic_force": b.antagonistic_force,
        })).collect::<Vec<_>>(),
        "lore": series.lore,
    })
}
