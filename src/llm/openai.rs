//! OpenAI 兼容 API 端口
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。请求与响应使用自定义 serde 结构
//! （byot），以便直接表达 tools / tool_choice / tool 角色消息。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::Client;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::{Completion, CompletionPort, LlmError, ToolChoice};
use crate::memory::{ToolCall, Turn};
use crate::tools::ToolSpec;

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// OpenAI 兼容端口：持有 Client 与 model 名
pub struct OpenAiPort {
    client: Client<OpenAIConfig>,
    model: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiPort {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            usage: TokenUsage::new(),
        }
    }

    fn build_request(&self, turns: &[Turn], tools: &[ToolSpec], choice: ToolChoice) -> Value {
        let mut request = json!({
            "model": self.model,
            "messages": to_wire_messages(turns),
        });
        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            request["tools"] = Value::Array(wire_tools);
            request["tool_choice"] = json!(match choice {
                ToolChoice::Any => "required",
                ToolChoice::Auto => "auto",
            });
        }
        request
    }
}

/// Turn 序列转为 chat.completions 的 messages
fn to_wire_messages(turns: &[Turn]) -> Vec<Value> {
    turns
        .iter()
        .map(|t| match t {
            Turn::System { text, .. } => json!({"role": "system", "content": text}),
            Turn::User { text } => json!({"role": "user", "content": text}),
            Turn::Agent { text, tool_calls } if tool_calls.is_empty() => {
                json!({"role": "assistant", "content": text})
            }
            Turn::Agent { text, tool_calls } => {
                let calls: Vec<Value> = tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {"name": c.name, "arguments": c.args.to_string()},
                        })
                    })
                    .collect();
                let content = if text.is_empty() { Value::Null } else { json!(text) };
                json!({"role": "assistant", "content": content, "tool_calls": calls})
            }
            Turn::ToolResult {
                tool_call_id,
                payload,
                error,
            } => {
                let content = match (error, payload) {
                    (Some(e), _) => format!("Error: {e}"),
                    (None, Value::String(s)) => s.clone(),
                    (None, other) => other.to_string(),
                };
                json!({"role": "tool", "tool_call_id": tool_call_id, "content": content})
            }
        })
        .collect()
}

fn map_openai_error(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::JSONDeserialize(..) | OpenAIError::InvalidArgument(_) => LlmError::Api(e.to_string()),
        other => LlmError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl CompletionPort for OpenAiPort {
    async fn complete(
        &self,
        turns: &[Turn],
        tools: &[ToolSpec],
        choice: ToolChoice,
    ) -> Result<Completion, LlmError> {
        let request = self.build_request(turns, tools, choice);
        let response: ChatResponse = self
            .client
            .chat()
            .create_byot(request)
            .await
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::Api("empty choices".to_string()))?;

        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|c| {
                // 参数不是合法 JSON 时保留原文，交给校验环节报错
                let args = serde_json::from_str(&c.function.arguments)
                    .unwrap_or(Value::String(c.function.arguments));
                ToolCall::new(c.id, c.function.name, args)
            })
            .collect();

        Ok(Completion {
            text: message.content,
            tool_calls,
        })
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_messages_tool_round() {
        let turns = vec![
            Turn::system("You are helpful."),
            Turn::user("status of 7"),
            Turn::agent_with_calls("", vec![ToolCall::new("c1", "check_order_status", json!({"order_id": 7}))]),
            Turn::tool_ok("c1", json!("preparation")),
            Turn::tool_err("c2", "boom"),
        ];
        let msgs = to_wire_messages(&turns);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[2]["content"], Value::Null);
        assert_eq!(msgs[2]["tool_calls"][0]["function"]["arguments"], "{\"order_id\":7}");
        assert_eq!(msgs[3]["content"], "preparation");
        assert_eq!(msgs[4]["content"], "Error: boom");
    }

    #[test]
    fn test_request_tool_choice() {
        let port = OpenAiPort::new(None, "gpt-4o-mini", Some("sk-test"));
        let spec = ToolSpec {
            name: "check_order_status".into(),
            description: "d".into(),
            parameters: json!({"type": "object"}),
        };
        let req = port.build_request(&[Turn::user("x")], &[spec], ToolChoice::Any);
        assert_eq!(req["tool_choice"], "required");
        assert_eq!(req["tools"][0]["function"]["name"], "check_order_status");
        let plain = port.build_request(&[Turn::user("x")], &[], ToolChoice::Any);
        assert!(plain.get("tools").is_none());
    }
}
