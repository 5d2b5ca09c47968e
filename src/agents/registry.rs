//! 助手注册表：内置助手集合，启动时一次性构建

use std::collections::HashMap;

use crate::agents::{prompts, AgentId, AgentKind, AgentProfile, ToolRoute};
use crate::core::AgentError;
use crate::llm::ToolChoice;
use crate::tools::{
    delegation_spec, finalize_spec, suggestion_spec, ToolRegistry, CANCEL_ORDER_TOOL, CHECK_ORDER_STATUS_TOOL,
    COMMENT_ORDER_TOOL, FOOD_SEARCH_TOOL, RETRIEVE_DOC_TOOL, WEB_SEARCH_TOOL,
};

#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    profiles: HashMap<AgentId, AgentProfile>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, profile: AgentProfile) {
        self.profiles.insert(profile.id, profile);
    }

    pub fn get(&self, id: AgentId) -> Result<&AgentProfile, AgentError> {
        self.profiles
            .get(&id)
            .ok_or_else(|| AgentError::Config(format!("agent {id} is not registered")))
    }

    /// 内置助手：主助手只负责委派；子助手均为仅工具调用并带 complete_or_escalate
    pub fn standard(tools: &ToolRegistry) -> Result<Self, AgentError> {
        let require = |name: &str| {
            tools
                .get(name)
                .ok_or_else(|| AgentError::Config(format!("tool {name} is not registered")))
        };

        let mut primary = AgentProfile::new(AgentId::Primary, prompts::PRIMARY, AgentKind::Conversational)
            .conversational(ToolChoice::Auto, false);
        for id in AgentId::SPECIALISTS {
            let name = id.delegation_tool();
            let spec = match id {
                AgentId::FoodSearch => delegation_spec(
                    &name,
                    "Hand over to the food search specialist when the user names a specific food or restaurant.",
                ),
                AgentId::FoodSuggestion => suggestion_spec(
                    &name,
                    "Hand over to the recommendation specialist when the user describes general preferences \
                     (cuisine, diet, taste, budget) rather than a specific food.",
                ),
                AgentId::OrderManagement => delegation_spec(
                    &name,
                    "Hand over to the order specialist to check status, comment on, or cancel an order.",
                ),
                _ => delegation_spec(
                    &name,
                    "Hand over to the food knowledge specialist for nutrition, safety, ingredient or preparation questions.",
                ),
            };
            primary = primary.with_route(spec, ToolRoute::Enter(id));
        }

        let food_search = AgentProfile::new(AgentId::FoodSearch, prompts::FOOD_SEARCH, AgentKind::Conversational)
            .safe(require(FOOD_SEARCH_TOOL)?)
            .with_route(finalize_spec(), ToolRoute::Finalize);

        let order_management =
            AgentProfile::new(AgentId::OrderManagement, prompts::ORDER_MANAGEMENT, AgentKind::Conversational)
                .safe(require(CHECK_ORDER_STATUS_TOOL)?)
                .safe(require(COMMENT_ORDER_TOOL)?)
                .sensitive(require(CANCEL_ORDER_TOOL)?)
                .with_route(finalize_spec(), ToolRoute::Finalize);

        let mut doc_retrieval =
            AgentProfile::new(AgentId::DocRetrieval, prompts::DOC_RETRIEVAL, AgentKind::Conversational)
                .safe(require(RETRIEVE_DOC_TOOL)?);
        if let Some(web) = tools.get(WEB_SEARCH_TOOL) {
            doc_retrieval = doc_retrieval.safe(web);
        }
        let doc_retrieval = doc_retrieval.with_route(finalize_spec(), ToolRoute::Finalize);

        let food_suggestion = AgentProfile::new(
            AgentId::FoodSuggestion,
            prompts::FOOD_SUGGESTION_DRAFT,
            AgentKind::Reflect,
        )
        .safe(require(FOOD_SEARCH_TOOL)?)
        .with_route(finalize_spec(), ToolRoute::Finalize);

        let mut registry = Self::new();
        for p in [primary, food_search, order_management, doc_retrieval, food_suggestion] {
            registry.register(p);
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{seed, InMemoryCatalog, InMemoryOrderStore};
    use crate::tools::{AvailableFoodSearchTool, CancelOrderTool, CheckOrderStatusTool, CommentOrderTool};
    use std::sync::Arc;

    fn tools_without_docs() -> ToolRegistry {
        let resolver = Arc::new(crate::catalog::EntityResolver::new(
            Arc::new(InMemoryCatalog::new(seed::foods())),
            1,
        ));
        let orders: Arc<dyn crate::catalog::OrderStore> = Arc::new(InMemoryOrderStore::new(seed::orders()));
        let mut reg = ToolRegistry::new();
        reg.register(AvailableFoodSearchTool::new(resolver));
        reg.register(CancelOrderTool::new(orders.clone()));
        reg.register(CommentOrderTool::new(orders.clone()));
        reg.register(CheckOrderStatusTool::new(orders));
        reg
    }

    #[test]
    fn test_missing_tool_is_config_error() {
        let err = AgentRegistry::standard(&tools_without_docs()).unwrap_err();
        assert!(matches!(err, AgentError::Config(msg) if msg.contains(RETRIEVE_DOC_TOOL)));
    }
}
