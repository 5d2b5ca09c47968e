//! 对话条目（Turn）
//!
//! 会话记录中的不可变条目：用户输入、助手输出（可带工具调用）、工具结果、系统通知。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单次工具调用请求（id 用于与 ToolResult 关联）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// 会话记录中的一条
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    User {
        text: String,
    },
    Agent {
        #[serde(default)]
        text: String,
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        tool_call_id: String,
        payload: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// internal = true 的系统条目不对终端用户展示（如助手切换通知）
    System {
        text: String,
        #[serde(default)]
        internal: bool,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn::User { text: text.into() }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Turn::Agent {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn agent_with_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Turn::Agent {
            text: text.into(),
            tool_calls,
        }
    }

    pub fn tool_ok(tool_call_id: impl Into<String>, payload: Value) -> Self {
        Turn::ToolResult {
            tool_call_id: tool_call_id.into(),
            payload,
            error: None,
        }
    }

    pub fn tool_err(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Turn::ToolResult {
            tool_call_id: tool_call_id.into(),
            payload: Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Turn::System {
            text: text.into(),
            internal: false,
        }
    }

    pub fn internal(text: impl Into<String>) -> Self {
        Turn::System {
            text: text.into(),
            internal: true,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Turn::Agent { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// 供摘要 / 日志使用的单行文本
    pub fn render(&self) -> String {
        match self {
            Turn::User { text } => format!("user: {text}"),
            Turn::Agent { text, tool_calls } if tool_calls.is_empty() => format!("assistant: {text}"),
            Turn::Agent { text, tool_calls } => {
                let names: Vec<&str> = tool_calls.iter().map(|c| c.name.as_str()).collect();
                format!("assistant: {text} [calls: {}]", names.join(", "))
            }
            Turn::ToolResult { payload, error, .. } => match error {
                Some(e) => format!("tool error: {e}"),
                None => format!("tool: {payload}"),
            },
            Turn::System { text, .. } => format!("system: {text}"),
        }
    }
}
