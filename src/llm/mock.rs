//! 离线 / 测试用补全端口（无需 API）
//!
//! - EchoPort：回显最后一条用户输入；必须调用工具时直接结束当前子助手，便于本地跑通流程
//! - ScriptedPort：按队列返回预设结果，并记录每次请求，供测试断言

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{Completion, CompletionPort, LlmError, ToolChoice};
use crate::memory::Turn;
use crate::tools::{ToolSpec, FINALIZE_TOOL};

/// Echo 端口：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct EchoPort;

#[async_trait]
impl CompletionPort for EchoPort {
    async fn complete(
        &self,
        turns: &[Turn],
        tools: &[ToolSpec],
        choice: ToolChoice,
    ) -> Result<Completion, LlmError> {
        let last_user = turns
            .iter()
            .rev()
            .find_map(|t| match t {
                Turn::User { text } => Some(text.as_str()),
                _ => None,
            })
            .unwrap_or("(no input)");

        if choice == ToolChoice::Any && tools.iter().any(|t| t.name == FINALIZE_TOOL) {
            return Ok(Completion::call(
                FINALIZE_TOOL,
                json!({"cancel": true, "reason": "offline mode, no model available"}),
            ));
        }
        Ok(Completion::text(format!("Echo from Mock: {last_user}")))
    }
}

/// 一次被记录的请求
#[derive(Debug, Clone)]
pub struct ScriptedRequest {
    pub turns: Vec<Turn>,
    pub tools: Vec<String>,
    pub choice: ToolChoice,
}

impl ScriptedRequest {
    /// 首条系统提示（若有）
    pub fn system_prompt(&self) -> Option<&str> {
        match self.turns.first() {
            Some(Turn::System { text, .. }) => Some(text.as_str()),
            _ => None,
        }
    }
}

/// 脚本化端口：按入队顺序返回结果；队列耗尽返回 Api 错误
#[derive(Debug, Default)]
pub struct ScriptedPort {
    responses: Mutex<VecDeque<Result<Completion, LlmError>>>,
    requests: Mutex<Vec<ScriptedRequest>>,
    delay: Option<Duration>,
}

impl ScriptedPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次响应前等待 delay（用于取消测试）
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push(&self, completion: Completion) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(Ok(completion));
        }
    }

    pub fn push_err(&self, err: LlmError) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(Err(err));
        }
    }

    pub fn requests(&self) -> Vec<ScriptedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CompletionPort for ScriptedPort {
    async fn complete(
        &self,
        turns: &[Turn],
        tools: &[ToolSpec],
        choice: ToolChoice,
    ) -> Result<Completion, LlmError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(ScriptedRequest {
                turns: turns.to_vec(),
                tools: tools.iter().map(|t| t.name.clone()).collect(),
                choice,
            });
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let next = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| Err(LlmError::Api("script exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_port_echoes_last_user() {
        let port = EchoPort;
        let out = port
            .complete(&[Turn::user("a"), Turn::agent("x"), Turn::user("b")], &[], ToolChoice::Auto)
            .await
            .unwrap();
        assert_eq!(out.text.as_deref(), Some("Echo from Mock: b"));
    }

    #[tokio::test]
    async fn test_scripted_port_records_and_exhausts() {
        let port = ScriptedPort::new();
        port.push(Completion::text("one"));
        let first = port.complete(&[Turn::user("q")], &[], ToolChoice::Any).await.unwrap();
        assert_eq!(first.text.as_deref(), Some("one"));
        assert!(port.complete(&[], &[], ToolChoice::Auto).await.is_err());
        let reqs = port.requests();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].choice, ToolChoice::Any);
    }
}
