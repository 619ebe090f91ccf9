//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::{ApiRetryPolicy, GateSettings, PipelineSettings};

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 生成模型配置
    #[serde(default)]
    pub model: ModelConfig,

    /// 流水线规模与契约参数
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// 设定库配置
    #[serde(default)]
    pub lore: LoreConfig,

    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Worker 配置
    #[serde(default)]
    pub worker: WorkerConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5070
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 生成模型配置
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// OpenAI 兼容接口地址
    #[serde(default = "default_model_url")]
    pub url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// 预设未指定模型时使用
    #[serde(default = "default_model_name")]
    pub default_model: String,

    /// 默认预设
    #[serde(default = "default_preset")]
    pub preset: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    /// API 调用最大尝试次数
    #[serde(default = "default_api_retries")]
    pub api_retries: u32,

    /// 退避基数（毫秒），第 n 次失败后等待 base * 2^n
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_model_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model_name() -> String {
    "anthropic/claude-3.5-sonnet".to_string()
}

fn default_preset() -> String {
    "balanced".to_string()
}

fn default_model_timeout() -> u64 {
    300
}

fn default_api_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            url: default_model_url(),
            api_key: None,
            default_model: default_model_name(),
            preset: default_preset(),
            timeout_secs: default_model_timeout(),
            api_retries: default_api_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl ModelConfig {
    pub fn retry_policy(&self) -> ApiRetryPolicy {
        ApiRetryPolicy::new(
            self.api_retries,
            Duration::from_millis(self.backoff_base_ms),
        )
    }
}

/// 流水线配置
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_book_count")]
    pub book_count: u32,

    #[serde(default = "default_chapters_per_book")]
    pub chapters_per_book: u32,

    #[serde(default = "default_target_word_count")]
    pub target_word_count: u32,

    #[serde(default = "default_scenes_per_chapter")]
    pub scenes_per_chapter: u32,

    #[serde(default = "default_beats_min")]
    pub beats_min: u32,

    #[serde(default = "default_beats_max")]
    pub beats_max: u32,

    #[serde(default = "default_prose_words_min")]
    pub prose_words_min: u32,

    #[serde(default = "default_prose_words_max")]
    pub prose_words_max: u32,

    /// 契约违规后的最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// 质量关卡驳回后的最大重新生成次数
    #[serde(default = "default_gate_retries")]
    pub gate_retries: u32,

    /// 字数分配容差（百分比）
    #[serde(default = "default_word_tolerance_pct")]
    pub word_tolerance_pct: u32,

    #[serde(default)]
    pub gates: GatesConfig,
}

fn default_book_count() -> u32 {
    3
}

fn default_chapters_per_book() -> u32 {
    15
}

fn default_target_word_count() -> u32 {
    100_000
}

fn default_scenes_per_chapter() -> u32 {
    3
}

fn default_beats_min() -> u32 {
    5
}

fn default_beats_max() -> u32 {
    10
}

fn default_prose_words_min() -> u32 {
    200
}

fn default_prose_words_max() -> u32 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_gate_retries() -> u32 {
    3
}

fn default_word_tolerance_pct() -> u32 {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            book_count: default_book_count(),
            chapters_per_book: default_chapters_per_book(),
            target_word_count: default_target_word_count(),
            scenes_per_chapter: default_scenes_per_chapter(),
            beats_min: default_beats_min(),
            beats_max: default_beats_max(),
            prose_words_min: default_prose_words_min(),
            prose_words_max: default_prose_words_max(),
            max_retries: default_max_retries(),
            gate_retries: default_gate_retries(),
            word_tolerance_pct: default_word_tolerance_pct(),
            gates: GatesConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// 流水线基础参数；规模参数会被任务配置覆盖
    pub fn settings(&self, use_lore: bool) -> PipelineSettings {
        PipelineSettings {
            book_count: self.book_count as usize,
            chapters_per_book: self.chapters_per_book as usize,
            target_word_count: self.target_word_count,
            scenes_per_chapter: self.scenes_per_chapter as usize,
            beats_min: self.beats_min as usize,
            beats_max: self.beats_max as usize,
            prose_words_min: self.prose_words_min as usize,
            prose_words_max: self.prose_words_max as usize,
            word_tolerance_pct: self.word_tolerance_pct,
            use_lore,
            gates: GateSettings {
                after_series: self.gates.after_series,
                after_book: self.gates.after_book,
                final_gate: self.gates.final_gate,
            },
            stop_after: None,
        }
    }
}

/// 质量关卡开关
#[derive(Debug, Clone, Deserialize)]
pub struct GatesConfig {
    #[serde(default = "default_true")]
    pub after_series: bool,

    #[serde(default = "default_true")]
    pub after_book: bool,

    #[serde(default = "default_true", rename = "final")]
    pub final_gate: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            after_series: true,
            after_book: true,
            final_gate: true,
        }
    }
}

/// 设定库配置
#[derive(Debug, Clone, Deserialize)]
pub struct LoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 每次查询返回的条目数
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// 嵌入向量维度
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_top_k() -> usize {
    10
}

fn default_dimension() -> usize {
    384
}

impl Default for LoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            dimension: default_dimension(),
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 检查点目录
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// 书稿导出目录
    #[serde(default = "default_manuscript_dir")]
    pub manuscript_dir: PathBuf,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("data/checkpoints")
}

fn default_manuscript_dir() -> PathBuf {
    PathBuf::from("data/manuscripts")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            manuscript_dir: default_manuscript_dir(),
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/fabula.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// 获取数据库 URL
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path)
    }
}

/// Worker 配置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// 队列轮询超时（毫秒）
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// 日志查询默认返回行数
    #[serde(default = "default_log_tail")]
    pub log_tail: u32,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

fn default_log_tail() -> u32 {
    100
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout_ms(),
            log_tail: default_log_tail(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
