//! 会话记录与调用前校验
//!
//! Transcript 只追加；摘要时才会整体裁掉旧条目。每次调用补全端口前通过 `validated` 生成
//! 结构合法的视图：工具调用与工具结果一一对应。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::memory::{ToolCall, Turn};

/// 有序、只追加的会话记录
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn extend(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.turns.extend(turns);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// 丢弃最近 keep 条之前的全部条目，返回被丢弃的部分
    pub fn prune_keep_last(&mut self, keep: usize) -> Vec<Turn> {
        if self.turns.len() <= keep {
            return Vec::new();
        }
        let cut = self.turns.len() - keep;
        self.turns.drain(..cut).collect()
    }

    /// 是否存在尚无 ToolResult 的调用（finalize_tool 除外）
    pub fn has_unmatched_calls(&self, finalize_tool: &str) -> bool {
        let answered = self.answered_ids();
        self.turns
            .iter()
            .flat_map(|t| t.tool_calls())
            .any(|c| c.name != finalize_tool && !answered.contains(c.id.as_str()))
    }

    /// 生成供补全端口读取的视图：
    /// - 含未配对的非 finalize 调用的 Agent 条目整条剔除
    /// - 未配对的 finalize 调用从其条目中去掉
    /// - 找不到对应调用（或重复）的 ToolResult 丢弃
    pub fn validated(&self, finalize_tool: &str) -> Vec<Turn> {
        let answered = self.answered_ids();
        let mut live_calls: HashSet<&str> = HashSet::new();
        let mut kept_agent: Vec<bool> = Vec::with_capacity(self.turns.len());

        for turn in &self.turns {
            let keep = match turn {
                Turn::Agent { tool_calls, .. } => tool_calls
                    .iter()
                    .all(|c| c.name == finalize_tool || answered.contains(c.id.as_str())),
                _ => true,
            };
            if keep {
                for c in turn.tool_calls() {
                    if answered.contains(c.id.as_str()) {
                        live_calls.insert(c.id.as_str());
                    }
                }
            }
            kept_agent.push(keep);
        }

        let mut seen_results: HashSet<&str> = HashSet::new();
        let mut view = Vec::with_capacity(self.turns.len());
        for (turn, keep) in self.turns.iter().zip(kept_agent) {
            if !keep {
                continue;
            }
            match turn {
                Turn::Agent { text, tool_calls } => {
                    let calls: Vec<ToolCall> = tool_calls
                        .iter()
                        .filter(|c| live_calls.contains(c.id.as_str()))
                        .cloned()
                        .collect();
                    if calls.is_empty() && text.is_empty() {
                        continue;
                    }
                    view.push(Turn::Agent {
                        text: text.clone(),
                        tool_calls: calls,
                    });
                }
                Turn::ToolResult { tool_call_id, .. } => {
                    if live_calls.contains(tool_call_id.as_str())
                        && seen_results.insert(tool_call_id.as_str())
                    {
                        view.push(turn.clone());
                    }
                }
                other => view.push(other.clone()),
            }
        }
        view
    }

    /// 面向终端用户的文本：用户输入、助手文字、非内部系统通知
    pub fn user_visible(&self) -> Vec<String> {
        self.turns
            .iter()
            .filter_map(|t| match t {
                Turn::User { text } => Some(format!("you: {text}")),
                Turn::Agent { text, .. } if !text.trim().is_empty() => Some(format!("assistant: {text}")),
                Turn::System { text, internal: false } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn answered_ids(&self) -> HashSet<&str> {
        self.turns
            .iter()
            .filter_map(|t| match t {
                Turn::ToolResult { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl From<Vec<Turn>> for Transcript {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}
