//! 反思修订：推荐助手的 Draft / Execute / Revise 循环

pub mod loop_;
pub mod state;

pub use loop_::{ReflectLoop, FORCED_FINALIZE_REASON};
pub use state::{
    Candidate, Evidence, FoodRecommendation, ProposedFood, QueryHits, ReflectOutcome, ReflectionState,
};

use crate::agents::AgentId;
use crate::memory::Transcript;
use crate::tools::SuggestionArgs;

/// 从记录中取最近一次委派给推荐助手时的诉求
pub fn last_suggestion_request(transcript: &Transcript) -> SuggestionArgs {
    let tool = AgentId::FoodSuggestion.delegation_tool();
    transcript
        .turns()
        .iter()
        .rev()
        .flat_map(|t| t.tool_calls().iter().rev())
        .find(|c| c.name == tool)
        .and_then(|c| serde_json::from_value(c.args.clone()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ToolCall, Turn};
    use serde_json::json;

    #[test]
    fn test_last_suggestion_request() {
        let mut t = Transcript::new();
        t.push(Turn::agent_with_calls(
            "",
            vec![ToolCall::new("a", "to_food_suggestion", json!({"criteria": "sweet"}))],
        ));
        t.push(Turn::agent_with_calls(
            "",
            vec![ToolCall::new("b", "to_food_suggestion", json!({"criteria": "spicy", "context": "cheap"}))],
        ));
        let req = last_suggestion_request(&t);
        assert_eq!(req.criteria, "spicy");
        assert_eq!(req.context.as_deref(), Some("cheap"));
        assert_eq!(last_suggestion_request(&Transcript::new()), SuggestionArgs::default());
    }
}
