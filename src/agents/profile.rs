//! 助手定义：标识、类型、工具分发表
//!
//! 分发表在注册时一次性建立：工具名 -> ToolRoute（安全 / 敏感 / 进入子助手 / 结束）。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::llm::ToolChoice;
use crate::tools::{Tool, ToolSpec};

/// 固定的助手集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    Primary,
    FoodSearch,
    FoodSuggestion,
    OrderManagement,
    DocRetrieval,
}

impl AgentId {
    pub const SPECIALISTS: [AgentId; 4] = [
        AgentId::FoodSearch,
        AgentId::FoodSuggestion,
        AgentId::OrderManagement,
        AgentId::DocRetrieval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Primary => "primary",
            AgentId::FoodSearch => "food_search",
            AgentId::FoodSuggestion => "food_suggestion",
            AgentId::OrderManagement => "order_management",
            AgentId::DocRetrieval => "doc_retrieval",
        }
    }

    /// 角色名（仅出现在内部通知中）
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentId::Primary => "Food Assistant",
            AgentId::FoodSearch => "Search Food Assistant",
            AgentId::FoodSuggestion => "Food Suggestion Assistant",
            AgentId::OrderManagement => "Order Management Assistant",
            AgentId::DocRetrieval => "Doc Retrieval Assistant",
        }
    }

    /// 主助手用于委派的工具名
    pub fn delegation_tool(&self) -> String {
        format!("to_{}", self.as_str())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 对话式助手走工具循环；Reflect 助手走反思修订循环
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Conversational,
    Reflect,
}

/// 工具名在某个助手下的处理方式
#[derive(Clone)]
pub enum ToolRoute {
    Safe(Arc<dyn Tool>),
    /// 执行前必须经过确认门
    Sensitive(Arc<dyn Tool>),
    Enter(AgentId),
    Finalize,
}

impl fmt::Debug for ToolRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolRoute::Safe(t) => write!(f, "Safe({})", t.name()),
            ToolRoute::Sensitive(t) => write!(f, "Sensitive({})", t.name()),
            ToolRoute::Enter(id) => write!(f, "Enter({id})"),
            ToolRoute::Finalize => f.write_str("Finalize"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub id: AgentId,
    pub prompt: String,
    pub kind: AgentKind,
    pub tool_choice: ToolChoice,
    /// 必须以工具调用作答（纯文本会被纠正重试）
    pub tool_call_only: bool,
    routes: HashMap<String, ToolRoute>,
    specs: Vec<ToolSpec>,
}

impl AgentProfile {
    pub fn new(id: AgentId, prompt: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            id,
            prompt: prompt.into(),
            kind,
            tool_choice: ToolChoice::Any,
            tool_call_only: true,
            routes: HashMap::new(),
            specs: Vec::new(),
        }
    }

    pub fn conversational(mut self, tool_choice: ToolChoice, tool_call_only: bool) -> Self {
        self.tool_choice = tool_choice;
        self.tool_call_only = tool_call_only;
        self
    }

    pub fn safe(self, tool: Arc<dyn Tool>) -> Self {
        let spec = ToolSpec::of(tool.as_ref());
        self.with_route(spec, ToolRoute::Safe(tool))
    }

    pub fn sensitive(self, tool: Arc<dyn Tool>) -> Self {
        let spec = ToolSpec::of(tool.as_ref());
        self.with_route(spec, ToolRoute::Sensitive(tool))
    }

    pub fn with_route(mut self, spec: ToolSpec, route: ToolRoute) -> Self {
        if !self.routes.contains_key(&spec.name) {
            self.specs.push(spec.clone());
        }
        self.routes.insert(spec.name, route);
        self
    }

    pub fn route(&self, tool_name: &str) -> Option<&ToolRoute> {
        self.routes.get(tool_name)
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn safe_tools(&self) -> Vec<&str> {
        self.names_where(|r| matches!(r, ToolRoute::Safe(_)))
    }

    pub fn sensitive_tools(&self) -> Vec<&str> {
        self.names_where(|r| matches!(r, ToolRoute::Sensitive(_)))
    }

    pub fn is_sensitive(&self, tool_name: &str) -> bool {
        matches!(self.route(tool_name), Some(ToolRoute::Sensitive(_)))
    }

    fn names_where(&self, pred: impl Fn(&ToolRoute) -> bool) -> Vec<&str> {
        self.specs
            .iter()
            .filter(|s| self.routes.get(&s.name).map(&pred).unwrap_or(false))
            .map(|s| s.name.as_str())
            .collect()
    }
}
