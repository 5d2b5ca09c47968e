//! 引擎过程事件：供前端展示步骤、工具调用、助手切换与确认请求

use serde::Serialize;

use crate::agents::AgentId;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// 第几次调用补全端口
    StepUpdate { step: usize, max_steps: usize },
    /// 正在调用补全端口
    Thinking { agent: AgentId },
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    ToolFailure { tool: String, reason: String },
    /// 助手栈变化
    Handoff { from: AgentId, to: AgentId },
    ConfirmationRequired {
        tool: String,
        args: serde_json::Value,
    },
    /// 错误恢复动作（RetryWithPrompt / Apologize / Defer 等）
    Recovery { action: String, detail: String },
    Compacted { dropped: usize },
    ReflectIteration { iteration: u32, candidates: usize },
    MessageDone { text: String },
    Error { text: String },
}

pub(crate) fn preview(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}
