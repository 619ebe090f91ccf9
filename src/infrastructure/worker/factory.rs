//! Pipeline Factory - 按任务配置组装流水线
//!
//! 模型、设定库与检查点存储在进程内共享；
//! 预设、规模参数与是否使用设定随任务变化。

use std::sync::Arc;

use crate::application::contract::RetryController;
use crate::application::error::PipelineError;
use crate::application::gate::QualityGate;
use crate::application::generator::{ApiRetryPolicy, Generator};
use crate::application::model_config::{Preset, StageModelMap};
use crate::application::pipeline::{Pipeline, PipelineSettings};
use crate::application::ports::{CheckpointPort, JobConfig, LoreStorePort, ModelPort, ModelRole};

pub struct PipelineFactory {
    model: Arc<dyn ModelPort>,
    checkpoints: Arc<dyn CheckpointPort>,
    lore: Option<(Arc<dyn LoreStorePort>, usize)>,
    api_policy: ApiRetryPolicy,
    default_model: String,
    max_retries: u32,
    gate_retries: u32,
    /// 任务配置未覆盖的参数（节拍范围、正文字数、容差、关卡开关）
    base_settings: PipelineSettings,
}

impl PipelineFactory {
    pub fn new(
        model: Arc<dyn ModelPort>,
        checkpoints: Arc<dyn CheckpointPort>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            model,
            checkpoints,
            lore: None,
            api_policy: ApiRetryPolicy::default(),
            default_model: default_model.into(),
            max_retries: 3,
            gate_retries: 3,
            base_settings: PipelineSettings::default(),
        }
    }

    pub fn with_lore(mut self, lore: Arc<dyn LoreStorePort>, top_k: usize) -> Self {
        self.lore = Some((lore, top_k));
        self
    }

    pub fn with_api_policy(mut self, policy: ApiRetryPolicy) -> Self {
        self.api_policy = policy;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, gate_retries: u32) -> Self {
        self.max_retries = max_retries;
        self.gate_retries = gate_retries;
        self
    }

    pub fn with_base_settings(mut self, settings: PipelineSettings) -> Self {
        self.base_settings = settings;
        self
    }

    pub fn checkpoints(&self) -> Arc<dyn CheckpointPort> {
        self.checkpoints.clone()
    }

    /// 任务配置 → 流水线参数
    pub fn settings_for(&self, config: &JobConfig) -> PipelineSettings {
        PipelineSettings {
            book_count: config.book_count as usize,
            chapters_per_book: config.chapters_per_book as usize,
            target_word_count: config.target_word_count,
            scenes_per_chapter: config.scenes_per_chapter as usize,
            use_lore: config.use_lore && self.lore.is_some(),
            ..self.base_settings.clone()
        }
    }

    pub fn build(&self, config: &JobConfig) -> Result<Pipeline, PipelineError> {
        let preset = Preset::from_str(&config.preset).ok_or_else(|| {
            PipelineError::InvalidState(format!("unknown model preset '{}'", config.preset))
        })?;
        let models = StageModelMap::from_preset(preset, &self.default_model);
        let settings = self.settings_for(config);

        let mut generator = Generator::new(self.model.clone(), self.api_policy);
        let lore = self.lore.as_ref().filter(|_| settings.use_lore);
        if let Some((store, top_k)) = lore {
            generator = generator.with_lore(store.clone(), *top_k);
        }
        let generator = Arc::new(generator);

        let mut gate = QualityGate::new(
            generator.clone(),
            models.options(ModelRole::Qa),
            models.options(ModelRole::Lore),
            self.gate_retries,
        );
        if let Some((store, _)) = lore {
            gate = gate.with_lore_store(store.clone());
        }

        tracing::debug!(
            preset = %preset,
            books = settings.book_count,
            chapters = settings.chapters_per_book,
            use_lore = settings.use_lore,
            "Pipeline assembled"
        );

        Ok(Pipeline::new(
            generator,
            models,
            RetryController::new(self.max_retries),
            gate,
            self.checkpoints.clone(),
            settings,
        ))
    }
}
