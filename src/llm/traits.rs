//! 补全端口抽象
//!
//! 所有后端（OpenAI 兼容 / Echo / Scripted）实现 CompletionPort：给定对话条目与可调用工具，
//! 返回自然语言文本或一个以上的结构化工具调用。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::{ToolCall, Turn};
use crate::tools::ToolSpec;

/// 补全端口错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("request timed out")]
    Timeout,
    /// 网络 / 服务端暂时不可用，可重试
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// 请求被拒绝或响应无法解析，不重试
    #[error("api error: {0}")]
    Api(String),
    #[error("cancelled")]
    Cancelled,
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Timeout | LlmError::Unavailable(_))
    }
}

/// 工具选择策略：Any 必须调用工具，Auto 由模型决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Any,
    Auto,
}

/// 一次补全的结构化结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn call(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            text: None,
            tool_calls: vec![ToolCall::new(uuid::Uuid::new_v4().to_string(), name, args)],
        }
    }

    pub fn with_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { text: None, tool_calls }
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// 既无文字也无工具调用
    pub fn is_blank(&self) -> bool {
        self.tool_calls.is_empty() && self.text_or_empty().trim().is_empty()
    }
}

/// 补全端口 trait；系统提示以首条 `Turn::System` 传入
#[async_trait]
pub trait CompletionPort: Send + Sync {
    async fn complete(
        &self,
        turns: &[Turn],
        tools: &[ToolSpec],
        choice: ToolChoice,
    ) -> Result<Completion, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
