//! 有界反思修订循环：Draft -> Execute -> Revise -> Execute -> ... -> Finalize
//!
//! Execute 对每个候选与细化查询并发调用实体解析工具，候选只保留目录中核实过的条目；
//! Revise 开始时若 iteration 已达上限，不再调用模型，直接合成 Finalize。

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::agents::{prompts, AgentProfile, ToolRoute};
use crate::core::AgentError;
use crate::dialog::EngineEvent;
use crate::llm::{CompletionPort, ToolChoice};
use crate::memory::{ToolCall, Turn};
use crate::reflect::state::{entry_from_row, DRAFT_TOOL, REVISE_TOOL};
use crate::reflect::{
    Candidate, Evidence, FoodRecommendation, ProposedFood, QueryHits, ReflectOutcome, ReflectionState,
};
use crate::tools::{
    finalize_spec, parse_args, schema_of, CompleteOrEscalate, SuggestionArgs, Tool, ToolExecutor, ToolSpec,
    FINALIZE_TOOL, FOOD_SEARCH_TOOL,
};

pub const FORCED_FINALIZE_REASON: &str = "Task was successfully completed, no escalation needed.";
const DRAFT_FAILED_REASON: &str = "Could not draft a food recommendation.";
const MAX_QUERY_HITS: usize = 8;

enum ReviseStep {
    Revised(FoodRecommendation),
    Finalize(CompleteOrEscalate),
}

pub struct ReflectLoop {
    port: Arc<dyn CompletionPort>,
    executor: Arc<ToolExecutor>,
    max_iterations: u32,
    max_reprompts: usize,
    event_tx: Option<UnboundedSender<EngineEvent>>,
}

impl ReflectLoop {
    pub fn new(
        port: Arc<dyn CompletionPort>,
        executor: Arc<ToolExecutor>,
        max_iterations: u32,
        max_reprompts: usize,
    ) -> Self {
        Self {
            port,
            executor,
            max_iterations,
            max_reprompts,
            event_tx: None,
        }
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<EngineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// 运行整个循环；端口错误向上传播，由路由统一致歉
    pub async fn run(&self, profile: &AgentProfile, request: &SuggestionArgs) -> Result<ReflectOutcome, AgentError> {
        let search = match profile.route(FOOD_SEARCH_TOOL) {
            Some(ToolRoute::Safe(tool)) => tool.clone(),
            _ => {
                return Err(AgentError::Config(format!(
                    "agent {} has no {FOOD_SEARCH_TOOL} tool",
                    profile.id
                )))
            }
        };
        let human = human_message(request);

        let draft = match self.draft(&human).await? {
            Some(d) => d,
            None => {
                return Ok(ReflectOutcome {
                    cancel: true,
                    reason: DRAFT_FAILED_REASON.to_string(),
                    candidates: Vec::new(),
                    iterations: 0,
                })
            }
        };

        let mut state = ReflectionState::default();
        let mut evidence = self.execute(search.as_ref(), &draft).await;
        apply(&mut state, &draft, &evidence);
        self.emit(EngineEvent::ReflectIteration {
            iteration: state.iteration,
            candidates: state.candidates.len(),
        });

        loop {
            match self.revise(&mut state, &human, &evidence).await? {
                ReviseStep::Finalize(args) => {
                    tracing::info!(
                        iterations = state.iteration,
                        candidates = state.candidates.len(),
                        cancel = args.cancel,
                        "reflection finalized"
                    );
                    return Ok(ReflectOutcome {
                        cancel: args.cancel,
                        reason: args.reason,
                        candidates: state.candidates,
                        iterations: state.iteration,
                    });
                }
                ReviseStep::Revised(proposal) => {
                    evidence = self.execute(search.as_ref(), &proposal).await;
                    apply(&mut state, &proposal, &evidence);
                    self.emit(EngineEvent::ReflectIteration {
                        iteration: state.iteration,
                        candidates: state.candidates.len(),
                    });
                }
            }
        }
    }

    async fn draft(&self, human: &str) -> Result<Option<FoodRecommendation>, AgentError> {
        let spec = recommendation_spec(
            DRAFT_TOOL,
            "Propose dishes matching the user's criteria, with a reflection and one refinement query.",
        );
        let base = vec![Turn::system(prompts::FOOD_SUGGESTION_DRAFT), Turn::user(human)];
        let call = self.call_until(base, vec![spec], &[DRAFT_TOOL]).await?;
        Ok(call.and_then(|c| parse_args::<FoodRecommendation>(c.args).ok()))
    }

    async fn revise(
        &self,
        state: &mut ReflectionState,
        human: &str,
        evidence: &Evidence,
    ) -> Result<ReviseStep, AgentError> {
        if state.iteration >= self.max_iterations {
            tracing::debug!(iteration = state.iteration, "reflection cap reached, finalizing");
            return Ok(ReviseStep::Finalize(forced_finalize()));
        }

        let spec = recommendation_spec(
            REVISE_TOOL,
            "Revise the recommendation list using the verified foods and search results.",
        );
        let base = vec![
            Turn::system(prompts::FOOD_SUGGESTION_REVISE),
            Turn::user(human),
            Turn::user(render_state(state, evidence)),
        ];
        let call = self
            .call_until(base, vec![spec, finalize_spec()], &[REVISE_TOOL, FINALIZE_TOOL])
            .await?;

        let Some(call) = call else {
            return Ok(ReviseStep::Finalize(forced_finalize()));
        };
        if call.name == FINALIZE_TOOL {
            let args = parse_args::<CompleteOrEscalate>(call.args).unwrap_or_else(|_| forced_finalize());
            return Ok(ReviseStep::Finalize(args));
        }
        match parse_args::<FoodRecommendation>(call.args) {
            Ok(proposal) => {
                state.iteration += 1;
                Ok(ReviseStep::Revised(proposal))
            }
            Err(e) => {
                tracing::warn!(error = %e, "unparseable revision, finalizing");
                Ok(ReviseStep::Finalize(forced_finalize()))
            }
        }
    }

    /// 调用端口直到返回指定工具之一；纯文本回答注入纠正提示后重试
    async fn call_until(
        &self,
        base: Vec<Turn>,
        specs: Vec<ToolSpec>,
        accepted: &[&str],
    ) -> Result<Option<ToolCall>, AgentError> {
        let mut turns = base;
        for attempt in 0..=self.max_reprompts {
            let completion = self.port.complete(&turns, &specs, ToolChoice::Any).await?;
            if let Some(call) = completion
                .tool_calls
                .into_iter()
                .find(|c| accepted.contains(&c.name.as_str()))
            {
                return Ok(Some(call));
            }
            tracing::debug!(attempt, "reflection step answered without a tool call");
            self.emit(EngineEvent::Recovery {
                action: "retry_with_prompt".to_string(),
                detail: prompts::TOOL_CALL_NUDGE.to_string(),
            });
            turns.push(Turn::user(prompts::TOOL_CALL_NUDGE));
        }
        Ok(None)
    }

    /// 并发核实候选名称与细化查询
    async fn execute(&self, search: &dyn Tool, proposal: &FoodRecommendation) -> Evidence {
        let mut seen = HashSet::new();
        let names: Vec<&ProposedFood> = proposal
            .suggested_foods
            .iter()
            .filter(|f| !f.name.trim().is_empty())
            .filter(|f| seen.insert(f.name.trim().to_lowercase()))
            .collect();
        let queries: Vec<&String> = proposal
            .search_queries
            .iter()
            .filter(|q| !q.trim().is_empty())
            .take(1)
            .collect();

        let lookups = join_all(names.iter().map(|f| self.verify(search, f)));
        let searches = join_all(queries.iter().map(|q| self.lookup(search, json!({"food_name": q}))));
        let (verified, hits) = tokio::join!(lookups, searches);

        let mut dedup = HashSet::new();
        let verified: Vec<Candidate> = verified
            .into_iter()
            .flatten()
            .filter(|c| dedup.insert((c.name.to_lowercase(), c.source.to_lowercase())))
            .collect();
        let query_hits = queries
            .into_iter()
            .zip(hits)
            .map(|(q, matches)| QueryHits {
                query: q.clone(),
                matches: matches.into_iter().take(MAX_QUERY_HITS).collect(),
            })
            .collect();
        Evidence { verified, query_hits }
    }

    /// 候选名称取最接近的目录条目；带餐厅但无结果时退回只按名称查
    async fn verify(&self, search: &dyn Tool, food: &ProposedFood) -> Option<Candidate> {
        let restaurant = food.restaurant.as_deref().filter(|r| !r.trim().is_empty());
        if let Some(r) = restaurant {
            let hits = self
                .lookup(search, json!({"food_name": food.name, "restaurant_name": r}))
                .await;
            if let Some(best) = hits.into_iter().next() {
                return Some(best);
            }
        }
        self.lookup(search, json!({"food_name": food.name}))
            .await
            .into_iter()
            .next()
    }

    async fn lookup(&self, search: &dyn Tool, args: Value) -> Vec<Candidate> {
        match self.executor.invoke(search, args).await {
            Ok(Value::Array(rows)) => rows
                .iter()
                .filter_map(entry_from_row)
                .map(|e| Candidate::from(&e))
                .collect(),
            Ok(other) => {
                tracing::warn!(result = %other, "unexpected food search result");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "food lookup failed");
                Vec::new()
            }
        }
    }

    fn emit(&self, ev: EngineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

fn apply(state: &mut ReflectionState, proposal: &FoodRecommendation, evidence: &Evidence) {
    state.candidates = evidence.verified.clone();
    state.critique = proposal.reflection.clone();
    state.refinement_queries = proposal.search_queries.clone();
}

fn forced_finalize() -> CompleteOrEscalate {
    CompleteOrEscalate {
        cancel: false,
        reason: FORCED_FINALIZE_REASON.to_string(),
    }
}

fn recommendation_spec(name: &str, description: &str) -> ToolSpec {
    ToolSpec::new(name, description, schema_of::<FoodRecommendation>())
}

pub(crate) fn human_message(request: &SuggestionArgs) -> String {
    match request.context.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(ctx) => format!("Criteria: {}\nContext: {ctx}", request.criteria),
        None => format!("Criteria: {}", request.criteria),
    }
}

fn render_state(state: &ReflectionState, evidence: &Evidence) -> String {
    json!({
        "iteration": state.iteration,
        "verified_foods": state.candidates,
        "previous_reflection": state.critique,
        "search_results": evidence.query_hits,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentId, AgentKind};
    use crate::catalog::{seed, EntityResolver, InMemoryCatalog};
    use crate::llm::{Completion, LlmError, ScriptedPort};
    use crate::tools::AvailableFoodSearchTool;

    fn profile() -> AgentProfile {
        let resolver = Arc::new(EntityResolver::new(Arc::new(InMemoryCatalog::new(seed::foods())), 1));
        AgentProfile::new(AgentId::FoodSuggestion, prompts::FOOD_SUGGESTION_DRAFT, AgentKind::Reflect)
            .safe(Arc::new(AvailableFoodSearchTool::new(resolver)))
            .with_route(finalize_spec(), ToolRoute::Finalize)
    }

    fn reflect(port: Arc<ScriptedPort>) -> ReflectLoop {
        ReflectLoop::new(port, Arc::new(ToolExecutor::new(5)), 2, 3)
    }

    fn proposal(names: &[(&str, Option<&str>)], query: &str) -> Value {
        let foods: Vec<Value> = names
            .iter()
            .map(|(n, r)| json!({"name": n, "restaurant": r, "price": 1.0}))
            .collect();
        json!({"suggested_foods": foods, "reflection": "needs spicier options", "search_queries": [query]})
    }

    fn request() -> SuggestionArgs {
        SuggestionArgs {
            criteria: "spicy".into(),
            context: Some("under $15".into()),
        }
    }

    #[tokio::test]
    async fn test_candidates_verified_against_catalog() {
        let port = Arc::new(ScriptedPort::new());
        port.push(Completion::call(
            DRAFT_TOOL,
            proposal(&[("Green Curry", None), ("Dragon Fire Noodles", None)], "Pad Thai"),
        ));
        port.push(Completion::call(FINALIZE_TOOL, json!({"cancel": false, "reason": "good list"})));

        let out = reflect(port.clone()).run(&profile(), &request()).await.unwrap();
        assert!(!out.cancel);
        assert_eq!(out.reason, "good list");
        assert_eq!(
            out.candidates,
            vec![Candidate {
                name: "Green Curry".into(),
                price: 12.5,
                source: "Bangkok Street".into()
            }]
        );
        // 第二次请求包含细化查询命中
        let reqs = port.requests();
        assert_eq!(reqs.len(), 2);
        let state_msg = reqs[1].turns.iter().rev().find_map(|t| match t {
            Turn::User { text } => Some(text.clone()),
            _ => None,
        });
        assert!(state_msg.unwrap().contains("Pad Thai"));
    }

    #[tokio::test]
    async fn test_iteration_cap_forces_finalize() {
        let port = Arc::new(ScriptedPort::new());
        port.push(Completion::call(DRAFT_TOOL, proposal(&[("Pad Thai", None)], "curry")));
        port.push(Completion::call(REVISE_TOOL, proposal(&[("Green Curry", None)], "noodles")));
        port.push(Completion::call(REVISE_TOOL, proposal(&[("Chicken Teriyaki", None)], "rice")));
        // 第三次 Revise 不应调用端口
        port.push(Completion::call(REVISE_TOOL, proposal(&[("Lasagna", None)], "pasta")));

        let out = reflect(port.clone()).run(&profile(), &request()).await.unwrap();
        assert_eq!(out.iterations, 2);
        assert!(!out.cancel);
        assert_eq!(out.reason, FORCED_FINALIZE_REASON);
        assert_eq!(out.candidates[0].name, "Chicken Teriyaki");
        assert_eq!(port.remaining(), 1);
    }

    #[tokio::test]
    async fn test_seeded_state_past_cap_finalizes() {
        let port = Arc::new(ScriptedPort::new());
        let r = reflect(port.clone());
        let mut state = ReflectionState {
            iteration: 3,
            ..Default::default()
        };
        let step = r.revise(&mut state, "Criteria: spicy", &Evidence::default()).await.unwrap();
        assert!(matches!(step, ReviseStep::Finalize(ref a) if !a.cancel));
        assert!(port.requests().is_empty());
        assert_eq!(state.iteration, 3);
    }

    #[tokio::test]
    async fn test_draft_without_tool_call_reprompts() {
        let port = Arc::new(ScriptedPort::new());
        port.push(Completion::text("Try the curry!"));
        port.push(Completion::call(DRAFT_TOOL, proposal(&[("Salmon Sushi", Some("Tokyo Bento"))], "sushi")));
        port.push(Completion::call(FINALIZE_TOOL, json!({"cancel": false, "reason": "done"})));

        let out = reflect(port.clone()).run(&profile(), &request()).await.unwrap();
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.candidates[0].price, 16.0);
        let second = &port.requests()[1];
        assert!(second
            .turns
            .iter()
            .any(|t| matches!(t, Turn::User { text } if text == prompts::TOOL_CALL_NUDGE)));
    }

    #[tokio::test]
    async fn test_port_error_propagates() {
        let port = Arc::new(ScriptedPort::new());
        port.push_err(LlmError::Timeout);
        let err = reflect(port).run(&profile(), &request()).await.unwrap_err();
        assert_eq!(err, AgentError::PortTimeout);
    }

    #[test]
    fn test_human_message() {
        assert_eq!(human_message(&request()), "Criteria: spicy\nContext: under $15");
        let bare = SuggestionArgs {
            criteria: "vegan".into(),
            context: None,
        };
        assert_eq!(human_message(&bare), "Criteria: vegan");
    }
}
