//! 各阶段模型配置
//!
//! 显式的 `角色 → {model, temperature, max_tokens}` 映射，构造时由预设生成，
//! 预设是纯数据，没有全局状态。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ports::{InvokeOptions, ModelRole};

/// 默认模型
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";

const HAIKU: &str = "anthropic/claude-3-haiku";
const FLASH_LITE: &str = "google/gemini-2.5-flash-lite";

/// 单个角色的模型参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageModelConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// 模型预设
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    #[default]
    Balanced,
    Creative,
    Precise,
    CostOptimized,
    Premium,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::Balanced,
        Preset::Creative,
        Preset::Precise,
        Preset::CostOptimized,
        Preset::Premium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Balanced => "balanced",
            Preset::Creative => "creative",
            Preset::Precise => "precise",
            Preset::CostOptimized => "cost_optimized",
            Preset::Premium => "premium",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    /// 预设覆盖项：(角色, 模型, 温度)
    fn overrides(&self) -> &'static [(ModelRole, Option<&'static str>, Option<f32>)] {
        use ModelRole::*;
        match self {
            Preset::Balanced => &[(Prose, None, Some(0.8))],
            Preset::Creative => &[
                (Series, None, Some(0.5)),
                (Book, None, Some(0.5)),
                (Chapter, None, Some(0.6)),
                (Scene, None, Some(0.7)),
                (Prose, None, Some(0.95)),
                (Qa, None, Some(0.6)),
            ],
            Preset::Precise => &[
                (Series, None, Some(0.2)),
                (Book, None, Some(0.2)),
                (Chapter, None, Some(0.3)),
                (Scene, None, Some(0.3)),
                (Prose, None, Some(0.5)),
                (Qa, None, Some(0.3)),
                (Lore, None, Some(0.2)),
            ],
            Preset::CostOptimized => &[
                (Series, Some(HAIKU), None),
                (Book, Some(HAIKU), None),
                (Chapter, Some(HAIKU), None),
                (Scene, Some(HAIKU), None),
                (Beat, Some(HAIKU), None),
                (Prose, Some(DEFAULT_MODEL), Some(0.8)),
                (Qa, Some(HAIKU), None),
                (Lore, Some(HAIKU), None),
            ],
            Preset::Premium => &[
                (Series, Some(FLASH_LITE), None),
                (Book, Some(FLASH_LITE), None),
                (Chapter, Some(FLASH_LITE), None),
                (Scene, Some(FLASH_LITE), None),
                (Beat, Some(FLASH_LITE), None),
                (Prose, Some(FLASH_LITE), Some(0.9)),
                (Qa, Some(FLASH_LITE), None),
                (Lore, Some(FLASH_LITE), None),
            ],
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 基础参数（温度, 最大 token）
fn base_params(role: ModelRole) -> (f32, u32) {
    match role {
        ModelRole::Series => (0.3, 4000),
        ModelRole::Book => (0.3, 16000),
        ModelRole::Chapter => (0.4, 3000),
        ModelRole::Scene => (0.5, 2000),
        ModelRole::Beat => (0.3, 1000),
        ModelRole::Prose => (0.8, 2000),
        ModelRole::Qa => (0.5, 2000),
        ModelRole::Lore => (0.4, 2000),
    }
}

/// 角色 → 模型参数映射
#[derive(Debug, Clone, PartialEq)]
pub struct StageModelMap {
    entries: BTreeMap<ModelRole, StageModelConfig>,
    seed: Option<u64>,
}

impl StageModelMap {
    /// 由预设构建；`default_model` 用于预设未指定模型的角色
    pub fn from_preset(preset: Preset, default_model: &str) -> Self {
        let mut entries: BTreeMap<ModelRole, StageModelConfig> = ModelRole::ALL
            .iter()
            .map(|&role| {
                let (temperature, max_tokens) = base_params(role);
                (
                    role,
                    StageModelConfig {
                        model: default_model.to_string(),
                        temperature,
                        max_tokens,
                    },
                )
            })
            .collect();

        for (role, model, temperature) in preset.overrides() {
            if let Some(entry) = entries.get_mut(role) {
                if let Some(model) = model {
                    entry.model = model.to_string();
                }
                if let Some(temperature) = temperature {
                    entry.temperature = *temperature;
                }
            }
        }

        Self {
            entries,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// 覆盖单个角色
    pub fn with_override(mut self, role: ModelRole, config: StageModelConfig) -> Self {
        self.entries.insert(role, config);
        self
    }

    pub fn get(&self, role: ModelRole) -> Option<&StageModelConfig> {
        self.entries.get(&role)
    }

    /// 生成调用参数
    pub fn options(&self, role: ModelRole) -> InvokeOptions {
        let (temperature, max_tokens) = base_params(role);
        let (model, temperature, max_tokens) = match self.entries.get(&role) {
            Some(c) => (c.model.clone(), c.temperature, c.max_tokens),
            None => (DEFAULT_MODEL.to_string(), temperature, max_tokens),
        };
        InvokeOptions {
            role,
            model,
            temperature,
            max_tokens,
            seed: self.seed,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModelRole, &StageModelConfig)> {
        self.entries.iter()
    }
}

impl Default for StageModelMap {
    fn default() -> Self {
        Self::from_preset(Preset::Balanced, DEFAULT_MODEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_defaults() {
        let map = StageModelMap::default();
        let book = map.options(ModelRole::Book);
        assert_eq!(book.model, DEFAULT_MODEL);
        assert_eq!(book.max_tokens, 16000);
        assert!((book.temperature - 0.3).abs() < f32::EPSILON);
        assert!((map.options(ModelRole::Prose).temperature - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cost_optimized_keeps_prose_model() {
        let map = StageModelMap::from_preset(Preset::CostOptimized, DEFAULT_MODEL);
        assert_eq!(map.options(ModelRole::Series).model, HAIKU);
        assert_eq!(map.options(ModelRole::Prose).model, DEFAULT_MODEL);
    }

    #[test]
    fn test_preset_parse() {
        for preset in Preset::ALL {
            assert_eq!(Preset::from_str(preset.as_str()), Some(preset));
        }
        assert_eq!(Preset::from_str("nsfw"), None);
    }

    #[test]
    fn test_override_and_seed() {
        let map = StageModelMap::default()
            .with_seed(Some(42))
            .with_override(
                ModelRole::Qa,
                StageModelConfig {
                    model: "openai/gpt-4".to_string(),
                    temperature: 0.5,
                    max_tokens: 1000,
                },
            );
        let qa = map.options(ModelRole::Qa);
        assert_eq!(qa.model, "openai/gpt-4");
        assert_eq!(qa.seed, Some(42));
    }
}
