//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供对话路由决定是重试、回报助手、致歉、延后还是终止。

use crate::core::{AgentError, RecoveryAction};

/// 致歉文案：补全端口不可用或单轮重试耗尽时展示给用户
pub const APOLOGY: &str =
    "Sorry, I couldn't complete that request right now. Please try again in a moment.";

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default, Clone)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::ValidationError(detail) => RecoveryAction::RetryWithPrompt(format!(
                "Your last tool call was invalid: {detail}. \
                 Check the tool name and fill the arguments exactly as the schema requires, then call the tool again."
            )),
            AgentError::ToolFault { tool, message } => {
                RecoveryAction::ReportToAgent(format!("Error: {tool} failed: {message}\n please fix your mistakes."))
            }
            AgentError::PortTimeout | AgentError::PortUnavailable(_) => RecoveryAction::Apologize,
            AgentError::CompactionFailure(_) => RecoveryAction::Defer,
            _ => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_validation_error() {
        let engine = RecoveryEngine::new();
        let err = AgentError::ValidationError("missing field `order_id`".to_string());
        match engine.handle(&err) {
            RecoveryAction::RetryWithPrompt(msg) => assert!(msg.contains("order_id")),
            other => panic!("Expected RetryWithPrompt, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_tool_fault() {
        let engine = RecoveryEngine::new();
        let err = AgentError::ToolFault {
            tool: "check_order_status".to_string(),
            message: "database is locked".to_string(),
        };
        match engine.handle(&err) {
            RecoveryAction::ReportToAgent(msg) => {
                assert!(msg.contains("check_order_status"));
                assert!(msg.contains("please fix your mistakes"));
            }
            other => panic!("Expected ReportToAgent, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_port_errors_apologize() {
        let engine = RecoveryEngine::new();
        assert_eq!(engine.handle(&AgentError::PortTimeout), RecoveryAction::Apologize);
        assert_eq!(
            engine.handle(&AgentError::PortUnavailable("503".to_string())),
            RecoveryAction::Apologize
        );
    }

    #[test]
    fn test_recovery_compaction_deferred() {
        let engine = RecoveryEngine::new();
        let err = AgentError::CompactionFailure("empty summary".to_string());
        assert_eq!(engine.handle(&err), RecoveryAction::Defer);
    }

    #[test]
    fn test_recovery_cancelled_aborts() {
        let engine = RecoveryEngine::new();
        assert_eq!(engine.handle(&AgentError::Cancelled), RecoveryAction::Abort);
    }
}
