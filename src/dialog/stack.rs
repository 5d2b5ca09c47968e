//! 助手栈：栈顶为当前助手，永不为空（根为主助手）
//!
//! 值类型：push / pop 返回新栈，不修改原值。反序列化时拒绝空栈。

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::agents::AgentId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<AgentId>", into = "Vec<AgentId>")]
pub struct DialogStack {
    frames: Vec<AgentId>,
}

impl DialogStack {
    pub fn new() -> Self {
        Self {
            frames: vec![AgentId::Primary],
        }
    }

    pub fn top(&self) -> AgentId {
        // frames 永不为空
        self.frames.last().copied().unwrap_or(AgentId::Primary)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[AgentId] {
        &self.frames
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.frames.contains(&id)
    }

    pub fn push(&self, id: AgentId) -> Self {
        let mut frames = self.frames.clone();
        frames.push(id);
        Self { frames }
    }

    /// 弹出栈顶；已在根部时返回 None
    pub fn pop(&self) -> Option<Self> {
        if self.frames.len() <= 1 {
            return None;
        }
        let mut frames = self.frames.clone();
        frames.pop();
        Some(Self { frames })
    }
}

/// 一步路由对助手栈的影响
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Enter(AgentId),
    Leave,
    Terminate,
}

impl Default for DialogStack {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Vec<AgentId>> for DialogStack {
    type Error = String;

    fn try_from(frames: Vec<AgentId>) -> Result<Self, Self::Error> {
        if frames.is_empty() {
            return Err("dialog stack must not be empty".to_string());
        }
        Ok(Self { frames })
    }
}

impl From<DialogStack> for Vec<AgentId> {
    fn from(stack: DialogStack) -> Self {
        stack.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_are_values() {
        let root = DialogStack::new();
        let pushed = root.push(AgentId::OrderManagement);
        assert_eq!(root.depth(), 1);
        assert_eq!(pushed.top(), AgentId::OrderManagement);
        let popped = pushed.pop().unwrap();
        assert_eq!(popped, root);
        assert!(root.pop().is_none());
    }

    #[test]
    fn test_deserialize_rejects_empty() {
        assert!(serde_json::from_str::<DialogStack>("[]").is_err());
        let s: DialogStack = serde_json::from_str(r#"["primary","food_search"]"#).unwrap();
        assert_eq!(s.depth(), 2);
        assert_eq!(s.top(), AgentId::FoodSearch);
    }
}
