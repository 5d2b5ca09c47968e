//! 引擎错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryWithPrompt / ReportToAgent / Apologize / Defer / Abort。

use thiserror::Error;

use crate::llm::LlmError;

/// 编排过程中可能出现的错误（工具、补全端口、确认状态、校验、摘要、存储等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 工具处理函数出错；在本地恢复为带 error 的 ToolResult
    #[error("Tool fault in {tool}: {message}")]
    ToolFault { tool: String, message: String },

    #[error("Completion port timed out")]
    PortTimeout,

    #[error("Completion port unavailable: {0}")]
    PortUnavailable(String),

    /// 调用方错误：会话没有（或已有）待确认操作
    #[error("Invalid confirmation state: {0}")]
    InvalidConfirmationState(String),

    /// 工具参数格式错误 / 未知工具名
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Compaction failed: {0}")]
    CompactionFailure(String),

    #[error("Cancelled")]
    Cancelled,

    /// 同一会话已有进行中的轮次
    #[error("Session {0} is busy")]
    SessionBusy(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<LlmError> for AgentError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout => AgentError::PortTimeout,
            LlmError::Cancelled => AgentError::Cancelled,
            LlmError::Unavailable(msg) | LlmError::Api(msg) => AgentError::PortUnavailable(msg),
        }
    }
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::Store(e.to_string())
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 将提示注入下一轮，让模型重试（如参数格式错误）
    RetryWithPrompt(String),
    /// 作为工具结果回给当前助手，由它决定重试或致歉
    ReportToAgent(String),
    /// 本轮失败，向用户致歉（会话保留）
    Apologize,
    /// 延后到下次触发（如摘要失败）
    Defer,
    /// 终止当前轮次，不修改会话
    Abort,
}
