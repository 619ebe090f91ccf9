//! Data Transfer Objects

use serde::{Deserialize, Serialize};

use crate::application::ports::{Concept, JobConfig, JobStatus};
use crate::application::{ControlJobResponse, EnqueueJobResponse, ResumeJobResponse};

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }
}

/// 空数据响应
#[derive(Debug, Serialize)]
pub struct Empty {}

impl ApiResponse<Empty> {
    /// 成功但无数据
    pub fn ok() -> Self {
        Self::success(Empty {})
    }
}

// ============================================================================
// Job DTOs
// ============================================================================

/// 未在请求中给出的任务参数取服务端配置
#[derive(Debug, Clone)]
pub struct JobDefaults {
    pub book_count: u32,
    pub chapters_per_book: u32,
    pub target_word_count: u32,
    pub scenes_per_chapter: u32,
    pub preset: String,
    pub use_lore: bool,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            book_count: 3,
            chapters_per_book: 15,
            target_word_count: 100_000,
            scenes_per_chapter: 3,
            preset: "balanced".to_string(),
            use_lore: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EnqueueJobRequest {
    pub project_id: String,
    pub concept: Concept,
    pub book_count: Option<u32>,
    pub chapters_per_book: Option<u32>,
    pub target_word_count: Option<u32>,
    pub scenes_per_chapter: Option<u32>,
    pub preset: Option<String>,
    pub use_lore: Option<bool>,
}

impl EnqueueJobRequest {
    pub fn into_config(self, defaults: &JobDefaults) -> (String, JobConfig) {
        let config = JobConfig {
            concept: self.concept,
            book_count: self.book_count.unwrap_or(defaults.book_count),
            chapters_per_book: self.chapters_per_book.unwrap_or(defaults.chapters_per_book),
            target_word_count: self.target_word_count.unwrap_or(defaults.target_word_count),
            scenes_per_chapter: self
                .scenes_per_chapter
                .unwrap_or(defaults.scenes_per_chapter),
            preset: self.preset.unwrap_or_else(|| defaults.preset.clone()),
            use_lore: self.use_lore.unwrap_or(defaults.use_lore),
            resume_from: None,
        };
        (self.project_id, config)
    }
}

#[derive(Debug, Deserialize)]
pub struct JobIdRequest {
    pub job_id: String,
}

#[derive(Debug, Deserialize)]
pub struct JobLogsRequest {
    pub job_id: String,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsParams {
    pub status: Option<String>,
    pub project_id: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueJobResult {
    pub job_id: String,
    pub project_id: String,
    pub status: JobStatus,
}

impl From<EnqueueJobResponse> for EnqueueJobResult {
    fn from(r: EnqueueJobResponse) -> Self {
        Self {
            job_id: r.job_id,
            project_id: r.project_id,
            status: r.status,
        }
    }
}

/// pause / cancel 响应；`deferred` 表示将在下一个边界生效
#[derive(Debug, Serialize)]
pub struct ControlJobResult {
    pub job_id: String,
    pub status: JobStatus,
    pub deferred: bool,
}

impl From<ControlJobResponse> for ControlJobResult {
    fn from(r: ControlJobResponse) -> Self {
        Self {
            job_id: r.job_id,
            status: r.status,
            deferred: r.deferred,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResumeJobResult {
    pub previous_job_id: String,
    pub job_id: String,
    pub resume_from: Option<String>,
}

impl From<ResumeJobResponse> for ResumeJobResult {
    fn from(r: ResumeJobResponse) -> Self {
        Self {
            previous_job_id: r.previous_job_id,
            job_id: r.job_id,
            resume_from: r.resume_from.map(|s| s.as_str().to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobListResult<T: Serialize> {
    pub total: usize,
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enqueue_request_fills_defaults() {
        let request: EnqueueJobRequest = serde_json::from_value(json!({
            "project_id": "tide",
            "concept": {"title": "Tidebound", "premise": "A drowned empire rises.", "genre": "Fantasy"},
            "book_count": 2,
            "use_lore": false
        }))
        .unwrap();

        let (project_id, config) = request.into_config(&JobDefaults::default());
        assert_eq!(project_id, "tide");
        assert_eq!(config.book_count, 2);
        assert_eq!(config.chapters_per_book, 15);
        assert_eq!(config.preset, "balanced");
        assert!(!config.use_lore);
        assert!(config.resume_from.is_none());
    }

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_value(ApiResponse::ok()).unwrap();
        assert_eq!(json, json!({"errno": 0, "error": "", "data": {}}));
    }
}
