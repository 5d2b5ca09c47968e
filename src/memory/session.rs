//! 会话状态：记录、助手栈、滚动摘要、待确认操作
//!
//! 作为值类型在一轮内被复制修改，成功（或挂起）后才整体写回检查点。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dialog::{DialogStack, PendingConfirmation};
use crate::memory::Transcript;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub transcript: Transcript,
    #[serde(default)]
    pub stack: DialogStack,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub pending: Option<PendingConfirmation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            transcript: Transcript::new(),
            stack: DialogStack::new(),
            summary: None,
            pending: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// 显式重置：唯一会清空摘要的途径
    pub fn reset(&mut self) {
        self.transcript = Transcript::new();
        self.stack = DialogStack::new();
        self.summary = None;
        self.pending = None;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentId;
    use crate::memory::Turn;

    #[test]
    fn test_new_session_rooted_at_primary() {
        let s = Session::new("abc");
        assert_eq!(s.stack.depth(), 1);
        assert_eq!(s.stack.top(), AgentId::Primary);
        assert!(s.pending.is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut s = Session::new("abc");
        s.transcript.push(Turn::user("hi"));
        s.summary = Some("x".into());
        s.stack = s.stack.push(AgentId::FoodSearch);
        s.reset();
        assert!(s.transcript.is_empty());
        assert!(s.summary.is_none());
        assert_eq!(s.stack.depth(), 1);
    }

    #[test]
    fn test_session_json_round_trip() {
        let mut s = Session::new("abc");
        s.transcript.push(Turn::user("hi"));
        s.stack = s.stack.push(AgentId::OrderManagement);
        let json = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
