//! 敏感操作确认门：Idle -> Suspended -> {Confirmed, Rejected} -> Idle
//!
//! 状态就是 `Session.pending`，随检查点一起持久化，可跨进程重启恢复。

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentId;
use crate::core::AgentError;
use crate::memory::{Session, ToolCall};

/// 被挂起、等待确认的敏感调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub agent: AgentId,
    pub call: ToolCall,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Confirm,
    Reject,
}

impl FromStr for Decision {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "y" | "yes" | "confirm" => Ok(Decision::Confirm),
            "n" | "no" | "reject" => Ok(Decision::Reject),
            other => Err(AgentError::InvalidInput(format!("unknown decision: {other}"))),
        }
    }
}

pub struct ConfirmationGate;

impl ConfirmationGate {
    pub fn state(session: &Session) -> GateState {
        if session.pending.is_some() {
            GateState::Suspended
        } else {
            GateState::Idle
        }
    }

    /// Idle -> Suspended；已挂起时拒绝（每个会话最多一个待确认操作）
    pub fn suspend(session: &mut Session, agent: AgentId, call: ToolCall) -> Result<(), AgentError> {
        if let Some(p) = &session.pending {
            return Err(AgentError::InvalidConfirmationState(format!(
                "session {} already awaits confirmation of {}",
                session.id, p.call.name
            )));
        }
        tracing::info!(session = %session.id, agent = %agent, tool = %call.name, "awaiting confirmation");
        session.pending = Some(PendingConfirmation {
            agent,
            call,
            requested_at: Utc::now(),
        });
        Ok(())
    }

    /// Suspended -> Idle，取出挂起的调用；没有待确认操作时报错
    pub fn take(session: &mut Session) -> Result<PendingConfirmation, AgentError> {
        session.pending.take().ok_or_else(|| {
            AgentError::InvalidConfirmationState(format!("session {} has no pending confirmation", session.id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cancel_call(id: &str) -> ToolCall {
        ToolCall::new(id, "cancel_order", json!({"order_id": 42, "phone_number": "555-1234"}))
    }

    #[test]
    fn test_second_suspend_rejected() {
        let mut s = Session::new("g");
        assert_eq!(ConfirmationGate::state(&s), GateState::Idle);
        ConfirmationGate::suspend(&mut s, AgentId::OrderManagement, cancel_call("a")).unwrap();
        assert_eq!(ConfirmationGate::state(&s), GateState::Suspended);
        let err = ConfirmationGate::suspend(&mut s, AgentId::OrderManagement, cancel_call("b")).unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfirmationState(_)));
        assert_eq!(s.pending.as_ref().unwrap().call.id, "a");
    }

    #[test]
    fn test_take_requires_pending() {
        let mut s = Session::new("g");
        assert!(matches!(
            ConfirmationGate::take(&mut s),
            Err(AgentError::InvalidConfirmationState(_))
        ));
        ConfirmationGate::suspend(&mut s, AgentId::OrderManagement, cancel_call("a")).unwrap();
        let p = ConfirmationGate::take(&mut s).unwrap();
        assert_eq!(p.call.name, "cancel_order");
        assert_eq!(ConfirmationGate::state(&s), GateState::Idle);
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!("YES".parse::<Decision>().unwrap(), Decision::Confirm);
        assert_eq!("reject".parse::<Decision>().unwrap(), Decision::Reject);
        assert!("maybe".parse::<Decision>().is_err());
    }
}
