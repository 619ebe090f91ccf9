//! 阶段指令模板
//!
//! 只描述输出结构与数量要求，数量在调用处填入。

pub fn series(book_count: usize) -> String {
    format!(
        r#"You are a series architect. Expand the concept into a multi-book series bible.

Return a JSON object:
{{"series": {{"title": "...", "logline": "...", "premise": "...", "genre": "...", "subgenres": ["..."],
  "target_audience": "...", "themes": ["..."], "persistent_threads": ["..."],
  "escalation_model": {{"book_1": "..."}},
  "books": [{{"book_number": 1, "title": "...", "premise": "...", "protagonist_goal": "...", "antagonistic_force": "...", "themes": ["..."]}}],
  "lore": {{"characters": [{{"name": "...", "role": "...", "description": "...", "traits": ["..."], "relationships": ["..."]}}],
            "locations": [{{"name": "...", "description": "...", "significance": "..."}}],
            "world_elements": [{{"name": "...", "type": "technology|magic|species|faction|organization", "description": "...", "rules": ["..."]}}]}},
  "style_guide": "..."}}}}

The "books" array MUST contain exactly {book_count} books numbered 1 to {book_count}."#,
    )
}

pub fn book(chapter_count: usize, book_number: u32) -> String {
    format!(
        r#"You are a book outliner. Outline book {book_number} of the series in four acts.

Return a JSON object:
{{"title": "...", "premise": "...",
  "act_structure": {{"act_1": {{"percentage": 25, "summary": "...", "key_events": ["..."], "ending_hook": "..."}},
                    "act_2a": {{"percentage": 25, ...}}, "act_2b": {{"percentage": 25, ...}}, "act_3": {{"percentage": 25, ...}}}},
  "character_arcs": [{{"character_name": "...", "starting_state": "...", "ending_state": "...", "transformation": "...", "key_moments": ["..."]}}],
  "chapters": [{{"chapter_number": 1, "title": "...", "act": 1, "purpose": "...", "plot_points": ["..."],
                "character_focus": {{"pov": "...", "present": ["..."], "arc_moments": ["..."]}},
                "setting": {{"location": "...", "time": "...", "atmosphere": "..."}}, "planned_word_count": 6000}}]}}

The "chapters" array MUST contain exactly {chapter_count} chapters numbered 1 to {chapter_count}.
Act percentages MUST add up to 100."#,
    )
}

pub fn chapter(min_scenes: usize, max_scenes: usize, planned_words: u32) -> String {
    format!(
        r#"You are a chapter developer. Break the chapter into scenes.

Return a JSON object:
{{"scenes": [{{"scene_number": 1, "title": "...", "purpose": "...", "scene_type": "action|dialogue|reflection|transition",
              "pov": "...", "setting": {{"location": "...", "time": "...", "atmosphere": "..."}},
              "characters_present": ["..."],
              "conflicts": [{{"type": "internal|interpersonal|external", "description": "..."}}],
              "turning_points": ["..."], "planned_word_count": 2000}}]}}

Write between {min_scenes} and {max_scenes} scenes. Every scene needs at least one conflict and one turning point.
Scene planned_word_count values should add up to {planned_words}."#,
    )
}

pub fn scene(min_beats: usize, max_beats: usize) -> String {
    format!(
        r#"You are a scene developer. Break the scene into story beats.

Return a JSON object:
{{"beats": [{{"beat_number": 1, "description": "...", "emotional_tone": "...", "character_actions": ["..."], "dialogue_summary": "..."}}]}}

Write between {min_beats} and {max_beats} beats."#,
    )
}

pub fn beat(beat_count: usize) -> String {
    format!(
        r#"You are a beat developer. Refine every beat of the scene: sharpen the emotional tone, concrete character actions and a dialogue summary. Keep the beat order.

Return a JSON object:
{{"beats": [{{"beat_number": 1, "description": "...", "emotional_tone": "...", "character_actions": ["..."], "dialogue_summary": "..."}}]}}

Return exactly {beat_count} beats."#,
    )
}

pub fn prose(min_words: usize, max_words: usize) -> String {
    format!(
        r#"You are a novelist. Write the prose for this beat. Continue seamlessly from the previous passage if one is given.

Return a JSON object:
{{"full_prose": "...",
  "paragraphs": [{{"paragraph_number": 1, "type": "narrative|dialogue|mixed|description|action|internal_monologue",
                  "content": "...", "pov_character": "...",
                  "dialogue_lines": [{{"speaker": "...", "dialogue": "...", "action": "...", "internal_thought": "..."}}]}}]}}

full_prose MUST be between {min_words} and {max_words} words."#,
    )
}

pub fn qa() -> &'static str {
    r#"You are a senior developmental editor. Review the content for structure, pacing, character arcs, theme integration and consistency.

Return a JSON object:
{"scores": {"structure": 8, "pacing": 7, "character_arcs": 8, "theme_integration": 7, "consistency": 8, "overall": 8},
 "approval": "approved|needs_revision|blocked",
 "critical_issues": ["..."], "major_issues": ["..."], "strengths": ["..."],
 "revision_tasks": [{"priority": "critical|high|medium|low", "description": "..."}],
 "reviewer_notes": "..."}

All scores are integers from 1 to 10. Approve only if overall >= 7 and there are no critical issues."#
}

pub fn lore() -> &'static str {
    r#"You are the lore master. Check the new content against the established lore and detect new lore elements.

Return a JSON object:
{"lore_violations": [{"type": "character|location|world_element", "element": "...", "violation": "...", "severity": "critical|major|minor"}],
 "new_lore_detected": [{"type": "character|location|technology|magic|species|faction|organization", "name": "...", "description": "...",
                        "should_add": true, "role": "...", "traits": ["..."], "significance": "...", "rules": ["..."]}],
 "consistency_score": 9,
 "approval": "approved|needs_revision",
 "notes": "..."}

Approve only if consistency_score >= 8 and there are no critical violations."#
}

/// 质量门反馈附加到重新生成请求
pub fn with_feedback(instructions: String, feedback: Option<&str>) -> String {
    match feedback {
        Some(feedback) if !feedback.is_empty() => format!(
            "{}\n\nREVIEW FEEDBACK FROM THE PREVIOUS ATTEMPT (address every point):\n{}",
            instructions, feedback
        ),
        _ => instructions,
    }
}
