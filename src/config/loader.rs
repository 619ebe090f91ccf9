//! Configuration Loader
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml / config.local.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;
use crate::application::Preset;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// # 环境变量示例
/// - `FABULA_SERVER__PORT=8080`
/// - `FABULA_MODEL__API_KEY=sk-...`
/// - `FABULA_PIPELINE__GATES__FINAL=false`
/// - `FABULA_STORAGE__CHECKPOINT_DIR=/data/checkpoints`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置；`None` 时搜索默认文件名
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 环境变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix("FABULA")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    // 未出现的字段由 serde 默认值补齐
    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// 验证配置有效性
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("Server port cannot be 0"));
    }

    if config.model.url.is_empty() {
        return Err(invalid("Model URL cannot be empty"));
    }
    if config.model.api_retries == 0 {
        return Err(invalid("model.api_retries must be at least 1"));
    }
    if Preset::from_str(&config.model.preset).is_none() {
        return Err(invalid(format!(
            "Unknown model preset: {}",
            config.model.preset
        )));
    }

    let p = &config.pipeline;
    if p.book_count == 0 || p.chapters_per_book == 0 || p.scenes_per_chapter == 0 {
        return Err(invalid(
            "pipeline book_count, chapters_per_book and scenes_per_chapter must be at least 1",
        ));
    }
    if p.beats_min == 0 || p.beats_min > p.beats_max {
        return Err(invalid(format!(
            "Invalid beat range: {}-{}",
            p.beats_min, p.beats_max
        )));
    }
    if p.prose_words_min == 0 || p.prose_words_min > p.prose_words_max {
        return Err(invalid(format!(
            "Invalid prose word range: {}-{}",
            p.prose_words_min, p.prose_words_max
        )));
    }
    if p.max_retries == 0 {
        return Err(invalid("pipeline.max_retries must be at least 1"));
    }
    if p.word_tolerance_pct == 0 || p.word_tolerance_pct >= 100 {
        return Err(invalid("pipeline.word_tolerance_pct must be within 1-99"));
    }

    if config.lore.enabled && (config.lore.top_k == 0 || config.lore.dimension == 0) {
        return Err(invalid("lore.top_k and lore.dimension must be positive"));
    }

    if config.storage.checkpoint_dir.as_os_str().is_empty() {
        return Err(invalid("Checkpoint directory cannot be empty"));
    }

    if config.database.path.is_empty() {
        return Err(invalid("Database path cannot be empty"));
    }

    if config.worker.queue_capacity == 0 {
        return Err(invalid("worker.queue_capacity must be at least 1"));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）；不输出 API key
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}", config.server.addr());
    tracing::info!("Model URL: {}", config.model.url);
    tracing::info!(
        "Model API Key: {}",
        if config.model.api_key.is_some() { "set" } else { "not set" }
    );
    tracing::info!("Default Model: {}", config.model.default_model);
    tracing::info!("Preset: {}", config.model.preset);
    tracing::info!(
        "API Retries: {} (backoff base {}ms)",
        config.model.api_retries,
        config.model.backoff_base_ms
    );
    tracing::info!(
        "Scale: {} books x {} chapters, {} words, {} scenes/chapter",
        config.pipeline.book_count,
        config.pipeline.chapters_per_book,
        config.pipeline.target_word_count,
        config.pipeline.scenes_per_chapter
    );
    tracing::info!(
        "Retries: contract {}, gate {}",
        config.pipeline.max_retries,
        config.pipeline.gate_retries
    );
    tracing::info!(
        "Gates: series={} book={} final={}",
        config.pipeline.gates.after_series,
        config.pipeline.gates.after_book,
        config.pipeline.gates.final_gate
    );
    tracing::info!("Lore Enabled: {}", config.lore.enabled);
    tracing::info!("Checkpoint Directory: {:?}", config.storage.checkpoint_dir);
    tracing::info!("Manuscript Directory: {:?}", config.storage.manuscript_dir);
    tracing::info!("Database: {}", config.database.path);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}
