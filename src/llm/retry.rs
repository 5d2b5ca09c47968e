//! 带超时与退避重试的补全端口包装
//!
//! 每次尝试都受 request_timeout 约束；Timeout / Unavailable 按指数退避重试 max_retries 次，其余错误直接返回。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{Completion, CompletionPort, LlmError, ToolChoice};
use crate::memory::Turn;
use crate::tools::ToolSpec;

/// 重试参数
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    pub fn from_llm_section(cfg: &crate::config::LlmSection) -> Self {
        Self {
            request_timeout: Duration::from_secs(cfg.request_timeout_secs),
            max_retries: cfg.max_retries,
            initial_backoff: Duration::from_millis(cfg.backoff_ms),
        }
    }
}

pub struct RetryingPort {
    inner: Arc<dyn CompletionPort>,
    config: RetryConfig,
}

impl RetryingPort {
    pub fn new(inner: Arc<dyn CompletionPort>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl CompletionPort for RetryingPort {
    async fn complete(
        &self,
        turns: &[Turn],
        tools: &[ToolSpec],
        choice: ToolChoice,
    ) -> Result<Completion, LlmError> {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0u32;
        loop {
            let result = match tokio::time::timeout(
                self.config.request_timeout,
                self.inner.complete(turns, tools, choice),
            )
            .await
            {
                Ok(r) => r,
                Err(_) => Err(LlmError::Timeout),
            };

            match result {
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "completion failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                other => return other,
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
