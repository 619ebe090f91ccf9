//! Beat 阶段：细化场景内的每个节拍
//!
//! 节拍数量必须与场景已有节拍一致，结果按位置合并，已有正文保留。

use serde_json::{json, Value};

use crate::application::coerce::{Coercer, CoercionError};
use crate::application::contract::Contract;
use crate::domain::content::{Beat, Scene};

use super::scene::parse_beat;

/// 细化后的节拍
#[derive(Debug, Clone, PartialEq)]
pub struct BeatRefinement {
    pub beats: Vec<Beat>,
}

pub fn contract(beat_count: usize) -> Contract<BeatRefinement> {
    Contract::<BeatRefinement>::new().exact("beats", "beat", beat_count, |r| r.beats.len())
}

pub fn parse(value: &Value) -> Result<BeatRefinement, Vec<CoercionError>> {
    let coercer = Coercer::new();
    let Some(root) = coercer.object("", value) else {
        return Err(coercer.into_errors());
    };
    let beats = root
        .req_items("beats")
        .iter()
        .enumerate()
        .map(|(index, b)| parse_beat(b, index as u32 + 1))
        .collect();
    coercer.finish(BeatRefinement { beats })
}

pub fn context(scene: &Scene) -> String {
    let view = json!({
        "scene": {
            "scene_number": scene.scene_number,
            "title": scene.title,
            "purpose": scene.purpose,
            "pov": scene.pov,
            "setting": scene.setting,
            "conflicts": scene.conflicts,
        },
        "beats": scene.beats.iter().map(|b| json!({
            "beat_number": b.beat_number,
            "description": b.description,
            "emotional_tone": b.emotional_tone,
            "character_actions": b.character_actions,
            "dialogue_summary": b.dialogue_summary,
        })).collect::<Vec<_>>(),
    });
    serde_json::to_string_pretty(&view).unwrap_or_else(|_| view.to_string())
}

/// 按位置合并；空字段不覆盖已有内容
pub fn apply(scene: &mut Scene, refinement: BeatRefinement) {
    for (beat, refined) in scene.beats.iter_mut().zip(refinement.beats) {
        if !refined.description.trim().is_empty() {
            beat.description = refined.description;
        }
        if !refined.emotional_tone.is_empty() {
            beat.emotional_tone = refined.emotional_tone;
        }
        if !refined.character_actions.is_empty() {
            beat.character_actions = refined.character_actions;
        }
        if !refined.dialogue_summary.is_empty() {
            beat.dialogue_summary = refined.dialogue_summary;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::content::Setting;

    fn scene() -> Scene {
        Scene {
            scene_number: 1,
            title: "Dock".to_string(),
            purpose: String::new(),
            scene_type: String::new(),
            pov: "Mara".to_string(),
            setting: Setting::default(),
            characters_present: Vec::new(),
            conflicts: Vec::new(),
            turning_points: Vec::new(),
            planned_word_count: 1000,
            actual_word_count: 0,
            beats: (1..=2)
                .map(|n| Beat {
                    beat_number: n,
                    description: format!("beat {}", n),
                    emotional_tone: "calm".to_string(),
                    character_actions: Vec::new(),
                    dialogue_summary: String::new(),
                    prose: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_count_must_match_existing() {
        let value = json!({"beats": [{"description": "only one"}]});
        let refinement = parse(&value).unwrap();
        let violations = contract(2).evaluate(&refinement);
        assert_eq!(violations[0].actual, "1");
    }

    #[test]
    fn test_merge_by_position() {
        let mut s = scene();
        let value = json!({"beats": [
            {"description": "Mara sprints to the pier", "emotional_tone": "dread"},
            {"description": "  ", "dialogue_summary": "Jon shouts a warning"}
        ]});
        apply(&mut s, parse(&value).unwrap());
        assert_eq!(s.beats[0].description, "Mara sprints to the pier");
        assert_eq!(s.beats[0].emotional_tone, "dread");
        assert_eq!(s.beats[1].description, "beat 2");
        assert_eq!(s.beats[1].emotional_tone, "calm");
        assert_eq!(s.beats[1].dialogue_summary, "Jon shouts a warning");
    }
}
