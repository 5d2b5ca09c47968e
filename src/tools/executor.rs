//! 工具执行器
//!
//! 对每次调用施加超时；处理函数的错误不向上抛出，而是转为带 error 的 ToolResult 条目，
//! 交回当前助手决定重试或致歉。每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::memory::{ToolCall, Turn};
use crate::tools::{Tool, ToolError};

/// 一次执行的结果：总会产生一条 ToolResult；error 供路由统计校验失败次数
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub turn: Turn,
    pub error: Option<AgentError>,
}

/// 工具执行器：超时 + 错误转条目 + 审计日志
pub struct ToolExecutor {
    timeout: Duration,
    recovery: RecoveryEngine,
}

impl ToolExecutor {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            recovery: RecoveryEngine::new(),
        }
    }

    /// 执行工具并返回原始结果；超时与处理函数失败为 ToolFault，参数错误为 ValidationError
    pub async fn invoke(&self, tool: &dyn Tool, args: Value) -> Result<Value, AgentError> {
        let start = Instant::now();
        let tool_name = tool.name().to_string();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(ToolError::Validation(_))) => (false, "invalid_args"),
            Ok(Err(ToolError::Fault(_))) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(ToolError::Validation(msg))) => {
                Err(AgentError::ValidationError(format!("{tool_name}: {msg}")))
            }
            Ok(Err(ToolError::Fault(message))) => Err(AgentError::ToolFault {
                tool: tool_name,
                message,
            }),
            Err(_) => Err(AgentError::ToolFault {
                tool: tool_name,
                message: format!("timed out after {}s", self.timeout.as_secs()),
            }),
        }
    }

    /// 执行一次工具调用，结果（含失败）转为与 call.id 关联的 ToolResult
    pub async fn run(&self, tool: &dyn Tool, call: &ToolCall) -> ToolRun {
        match self.invoke(tool, call.args.clone()).await {
            Ok(payload) => ToolRun {
                turn: Turn::tool_ok(&call.id, payload),
                error: None,
            },
            Err(err) => ToolRun {
                turn: Turn::tool_err(&call.id, self.error_text(&err)),
                error: Some(err),
            },
        }
    }

    /// 错误转为回给助手的文字
    pub fn error_text(&self, err: &AgentError) -> String {
        match self.recovery.handle(err) {
            RecoveryAction::RetryWithPrompt(msg) | RecoveryAction::ReportToAgent(msg) => msg,
            _ => err.to_string(),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
