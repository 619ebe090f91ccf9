//! Stage Generator
//!
//! 组装 prompt（指令 + 设定上下文 + 阶段上下文），调用模型，
//! 对传输层错误做指数退避重试。

use std::sync::Arc;
use std::time::Duration;

use crate::domain::content::Stage;

use super::ports::{format_lore_context, ApiError, InvokeOptions, LoreStorePort, ModelPort};

/// API 重试策略：`base * 2^attempt`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiRetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ApiRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl ApiRetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// 第 `attempt` 次失败后的等待时间（从 0 开始）
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// 单个单元的生成请求
#[derive(Debug, Clone)]
pub struct StageRequest {
    pub stage: Stage,
    /// 单元标识（日志与错误报告用），如 `book 1 chapter 3`
    pub unit: String,
    pub project_id: String,
    pub instructions: String,
    pub context: String,
    pub options: InvokeOptions,
    pub use_lore: bool,
}

/// 组装完整 prompt
pub fn build_prompt(instructions: &str, lore_context: &str, context: &str) -> String {
    format!(
        "{}\n\n{}\n\nContext:\n{}\n\nOutput (JSON only):",
        instructions, lore_context, context
    )
}

/// 生成器
pub struct Generator {
    model: Arc<dyn ModelPort>,
    lore: Option<Arc<dyn LoreStorePort>>,
    policy: ApiRetryPolicy,
    lore_top_k: usize,
}

impl Generator {
    pub fn new(model: Arc<dyn ModelPort>, policy: ApiRetryPolicy) -> Self {
        Self {
            model,
            lore: None,
            policy,
            lore_top_k: 10,
        }
    }

    pub fn with_lore(mut self, lore: Arc<dyn LoreStorePort>, top_k: usize) -> Self {
        self.lore = Some(lore);
        self.lore_top_k = top_k;
        self
    }

    /// 生成一次（含 API 重试）；`corrective` 为上一次尝试的纠正指令
    pub async fn generate(
        &self,
        request: &StageRequest,
        corrective: Option<&str>,
    ) -> Result<String, ApiError> {
        let lore_context = if request.use_lore {
            self.lore_context(&request.context, &request.project_id).await
        } else {
            String::new()
        };

        let instructions = match corrective {
            Some(corrective) => format!("{}\n\n{}", request.instructions, corrective),
            None => request.instructions.clone(),
        };

        let prompt = build_prompt(&instructions, &lore_context, &request.context);
        self.invoke(&prompt, &request.options).await
    }

    /// 调用模型，可重试错误按指数退避
    pub async fn invoke(&self, prompt: &str, options: &InvokeOptions) -> Result<String, ApiError> {
        let mut attempt = 0;
        loop {
            match self.model.invoke(prompt, options).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.delay(attempt);
                    tracing::warn!(
                        role = %options.role,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Model call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(role = %options.role, attempts = attempt + 1, error = %e, "Model call failed");
                    return Err(e);
                }
            }
        }
    }

    /// 查询设定上下文；查询失败只记录警告
    async fn lore_context(&self, query: &str, project_id: &str) -> String {
        let Some(lore) = &self.lore else {
            return String::new();
        };
        match lore.query(query, project_id, self.lore_top_k).await {
            Ok(entries) => format_lore_context(&entries),
            Err(e) => {
                tracing::warn!(project_id = %project_id, error = %e, "Lore query failed, continuing without lore");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{LoreEntry, LoreStoreError, LoreType, ModelRole};
    use crate::domain::content::Project;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FlakyModel {
        failures: Mutex<Vec<ApiError>>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelPort for FlakyModel {
        async fn invoke(&self, prompt: &str, _options: &InvokeOptions) -> Result<String, ApiError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.failures.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok("{}".to_string()),
            }
        }
    }

    struct FixedLore(Result<Vec<LoreEntry>, String>);

    #[async_trait]
    impl LoreStorePort for FixedLore {
        async fn store_all(&self, _project: &Project) -> Result<usize, LoreStoreError> {
            Ok(0)
        }

        async fn query(&self, _text: &str, _project_id: &str, _top_k: usize) -> Result<Vec<LoreEntry>, LoreStoreError> {
            self.0.clone().map_err(LoreStoreError::Backend)
        }

        async fn delete_project(&self, _project_id: &str) -> Result<(), LoreStoreError> {
            Ok(())
        }
    }

    fn options() -> InvokeOptions {
        InvokeOptions {
            role: ModelRole::Series,
            model: "m".to_string(),
            temperature: 0.3,
            max_tokens: 100,
            seed: None,
        }
    }

    fn request() -> StageRequest {
        StageRequest {
            stage: Stage::Series,
            unit: "series".to_string(),
            project_id: "p1".to_string(),
            instructions: "Create a series.".to_string(),
            context: "Title: Tidebound".to_string(),
            options: options(),
            use_lore: true,
        }
    }

    fn model(failures: Vec<ApiError>) -> Arc<FlakyModel> {
        Arc::new(FlakyModel {
            failures: Mutex::new(failures),
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = ApiRetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = build_prompt("Do it.", "", "ctx");
        assert_eq!(prompt, "Do it.\n\n\n\nContext:\nctx\n\nOutput (JSON only):");
    }

    #[tokio::test]
    async fn test_retryable_errors_are_retried() {
        let m = model(vec![ApiError::Timeout, ApiError::MalformedEnvelope("Expecting value".into())]);
        let generator = Generator::new(m.clone(), ApiRetryPolicy::new(3, Duration::ZERO));
        assert_eq!(generator.invoke("p", &options()).await.unwrap(), "{}");
        assert_eq!(m.prompts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let m = model(vec![ApiError::Timeout, ApiError::Timeout, ApiError::Timeout]);
        let generator = Generator::new(m.clone(), ApiRetryPolicy::new(3, Duration::ZERO));
        assert!(matches!(generator.invoke("p", &options()).await, Err(ApiError::Timeout)));
        assert_eq!(m.prompts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let m = model(vec![ApiError::Provider { status: 401, message: "bad key".into() }]);
        let generator = Generator::new(m.clone(), ApiRetryPolicy::new(3, Duration::ZERO));
        assert!(generator.invoke("p", &options()).await.is_err());
        assert_eq!(m.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lore_injected_and_corrective_appended() {
        let m = model(Vec::new());
        let lore = Arc::new(FixedLore(Ok(vec![LoreEntry {
            lore_type: LoreType::Location,
            name: "Saltmarch".to_string(),
            content: serde_json::json!({"description": "A flooded city"}),
            score: 0.8,
        }])));
        let generator = Generator::new(m.clone(), ApiRetryPolicy::new(1, Duration::ZERO)).with_lore(lore, 5);

        generator.generate(&request(), Some("Fix the count.")).await.unwrap();

        let prompt = m.prompts.lock().unwrap()[0].clone();
        assert!(prompt.starts_with("Create a series.\n\nFix the count.\n\n### ESTABLISHED LORE:"));
        assert!(prompt.contains("**Location: Saltmarch**"));
        assert!(prompt.ends_with("Context:\nTitle: Tidebound\n\nOutput (JSON only):"));
    }

    #[tokio::test]
    async fn test_lore_failure_degrades_to_empty_block() {
        let m = model(Vec::new());
        let lore = Arc::new(FixedLore(Err("index unavailable".to_string())));
        let generator = Generator::new(m.clone(), ApiRetryPolicy::new(1, Duration::ZERO)).with_lore(lore, 5);

        generator.generate(&request(), None).await.unwrap();

        let prompt = m.prompts.lock().unwrap()[0].clone();
        assert!(!prompt.contains("ESTABLISHED LORE"));
    }
}
