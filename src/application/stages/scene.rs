//! Scene 阶段：场景 → 节拍

use serde_json::{json, Value};

use crate::application::coerce::{Coercer, CoercionError, Fields};
use crate::application::contract::Contract;
use crate::domain::content::{Beat, Chapter, Scene};

/// 场景节拍列表
#[derive(Debug, Clone, PartialEq)]
pub struct BeatSheet {
    pub beats: Vec<Beat>,
}

pub fn contract(beats_min: usize, beats_max: usize) -> Contract<BeatSheet> {
    Contract::<BeatSheet>::new().range("beats", "beat", beats_min, Some(beats_max), |s| s.beats.len())
}

pub fn parse(value: &Value) -> Result<BeatSheet, Vec<CoercionError>> {
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
    coercer.finish(BeatSheet { beats })
}

/// 节拍字段（Beat 阶段复用）
pub(crate) fn parse_beat(b: &Fields<'_>, position: u32) -> Beat {
    Beat {
        beat_number: b.uint_or("beat_number", position),
        description: b.string("description"),
        emotional_tone: b.string_or("emotional_tone", ""),
        character_actions: b.strings("character_actions"),
        dialogue_summary: b.string_or("dialogue_summary", ""),
        prose: None,
    }
}

pub fn context(chapter: &Chapter, scene: &Scene) -> String {
    let view = json!({
        "chapter": {
            "chapter_number": chapter.chapter_number,
            "title": chapter.title,
            "purpose": chapter.purpose,
        },
        "scene": {
            "scene_number": scene.scene_number,
            "title": scene.title,
            "purpose": scene.purpose,
            "scene_type": scene.scene_type,
            "pov": scene.pov,
            "setting": scene.setting,
            "characters_present": scene.characters_present,
            "conflicts": scene.conflicts,
            "turning_points": scene.turning_points,
            "planned_word_count": scene.planned_word_count,
        },
    });
    serde_json::to_string_pretty(&view).unwrap_or_else(|_| view.to_string())
}

pub fn apply(scene: &mut Scene, sheet: BeatSheet) {
    scene.beats = sheet
        .beats
        .into_iter()
        .enumerate()
        .map(|(index, mut beat)| {
            beat.beat_number = index as u32 + 1;
            beat
        })
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_range() {
        let value = json!({"beats": [
            {"description": "Mara reaches the dock", "character_actions": "runs"},
            {"description": "The rope snaps", "emotional_tone": "panic"}
        ]});
        let sheet = parse(&value).unwrap();
        assert_eq!(sheet.beats[0].character_actions, vec!["runs"]);

        let violations = contract(3, 5).evaluate(&sheet);
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].message,
            "TOO FEW beats: You generated 2 beats, required 3-5. Add at least 1 more."
        );
        assert!(contract(2, 5).evaluate(&sheet).is_empty());
    }

    #[test]
    fn test_description_required() {
        let errors = parse(&json!({"beats": [{"emotional_tone": "calm"}]})).unwrap_err();
        assert_eq!(errors[0].path, "beats[0].description");
    }
}
