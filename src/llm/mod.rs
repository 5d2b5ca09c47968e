//! LLM 层：补全端口抽象与实现（OpenAI 兼容 / Echo / Scripted）及重试包装

pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

pub use mock::{EchoPort, ScriptedPort, ScriptedRequest};
pub use openai::{OpenAiPort, TokenUsage};
pub use retry::{RetryConfig, RetryingPort};
pub use traits::{Completion, CompletionPort, LlmError, ToolChoice};
