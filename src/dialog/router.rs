//! 对话路由：一轮用户输入（或一次确认决定）的驱动循环
//!
//! 每一步以栈顶助手的提示 + 校验后的记录视图调用补全端口，然后按该助手的分发表处理工具调用：
//! - Safe：直接经执行器运行，结果写回记录
//! - Sensitive：挂起到确认门，本轮结束
//! - Enter：写入确认结果与内部通知，子助手入栈，由新栈顶继续
//! - Finalize：子助手出栈并交回父助手；在根部则结束本轮
//!
//! 同一条回复中控制流转移之后的调用不再执行，统一以 error 结果应答，保证记录中每个调用都有结果。

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;

use crate::agents::{prompts, AgentId, AgentKind, AgentProfile, AgentRegistry, ToolRoute};
use crate::config::EngineSection;
use crate::core::{recovery::APOLOGY, AgentError, RecoveryAction, RecoveryEngine};
use crate::dialog::events::preview;
use crate::dialog::{ConfirmationGate, Decision, EngineEvent, PendingConfirmation, Transition};
use crate::llm::{Completion, CompletionPort};
use crate::memory::{Compactor, Session, ToolCall, Turn};
use crate::reflect::{last_suggestion_request, ReflectLoop, ReflectOutcome};
use crate::tools::{parse_args, CompleteOrEscalate, ToolExecutor, ToolRun, FINALIZE_TOOL};

/// 单轮上限
#[derive(Debug, Clone, Copy)]
pub struct RouterLimits {
    pub max_reprompts: usize,
    pub max_validation_attempts: usize,
    pub max_steps: usize,
    pub max_reflection_iterations: u32,
}

impl From<&EngineSection> for RouterLimits {
    fn from(cfg: &EngineSection) -> Self {
        Self {
            max_reprompts: cfg.max_reprompts,
            max_validation_attempts: cfg.max_validation_attempts,
            max_steps: cfg.max_steps,
            max_reflection_iterations: cfg.max_reflection_iterations,
        }
    }
}

impl Default for RouterLimits {
    fn default() -> Self {
        Self::from(&EngineSection::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed,
    AwaitingConfirmation(PendingConfirmation),
    /// 已向用户致歉；会话状态保留
    Failed(String),
}

/// 一轮的结果：给用户的回复、栈变化序列、结束方式
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub reply: Option<String>,
    pub transitions: Vec<Transition>,
    pub outcome: TurnOutcome,
}

impl TurnReport {
    pub fn pending(&self) -> Option<&PendingConfirmation> {
        match &self.outcome {
            TurnOutcome::AwaitingConfirmation(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Default)]
struct TurnCtx {
    steps: usize,
    validation_failures: usize,
    transitions: Vec<Transition>,
}

enum Flow {
    Continue,
    Suspended(PendingConfirmation),
    Reply(String),
}

pub struct DialogRouter {
    agents: Arc<AgentRegistry>,
    port: Arc<dyn CompletionPort>,
    executor: Arc<ToolExecutor>,
    compactor: Compactor,
    reflect: ReflectLoop,
    recovery: RecoveryEngine,
    limits: RouterLimits,
    event_tx: Option<UnboundedSender<EngineEvent>>,
}

impl DialogRouter {
    pub fn new(
        agents: Arc<AgentRegistry>,
        port: Arc<dyn CompletionPort>,
        executor: Arc<ToolExecutor>,
        compactor: Compactor,
        limits: RouterLimits,
    ) -> Self {
        let reflect = ReflectLoop::new(
            port.clone(),
            executor.clone(),
            limits.max_reflection_iterations,
            limits.max_reprompts,
        );
        Self {
            agents,
            port,
            executor,
            compactor,
            reflect,
            recovery: RecoveryEngine::new(),
            limits,
            event_tx: None,
        }
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<EngineEvent>) -> Self {
        self.reflect = self.reflect.with_event_tx(tx.clone());
        self.event_tx = Some(tx);
        self
    }

    pub fn compactor(&self) -> &Compactor {
        &self.compactor
    }

    /// 处理一条用户输入；会话有待确认操作时拒绝
    pub async fn handle_user_turn(&self, session: &mut Session, text: &str) -> Result<TurnReport, AgentError> {
        if let Some(p) = &session.pending {
            return Err(AgentError::InvalidConfirmationState(format!(
                "session {} awaits confirmation of {}; confirm or reject it first",
                session.id, p.call.name
            )));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(AgentError::InvalidInput("empty message".to_string()));
        }

        session.transcript.push(Turn::user(text));
        self.compact_if_needed(session).await;

        let mut ctx = TurnCtx::default();
        self.drive(session, &mut ctx).await
    }

    /// 处理确认决定：确认则执行挂起的调用并由同一助手继续；拒绝则写入拒绝通知、出栈，由父助手回复
    pub async fn resume(&self, session: &mut Session, decision: Decision) -> Result<TurnReport, AgentError> {
        let pending = ConfirmationGate::take(session)?;
        let profile = self.agents.get(pending.agent)?;
        let mut ctx = TurnCtx::default();
        tracing::info!(session = %session.id, tool = %pending.call.name, ?decision, "confirmation resolved");

        match decision {
            Decision::Confirm => {
                let tool = match profile.route(&pending.call.name) {
                    Some(ToolRoute::Sensitive(tool)) => tool.clone(),
                    _ => {
                        return Err(AgentError::Config(format!(
                            "{} is not a sensitive tool of {}",
                            pending.call.name, profile.id
                        )))
                    }
                };
                self.emit(EngineEvent::ToolCall {
                    tool: pending.call.name.clone(),
                    args: pending.call.args.clone(),
                });
                let run = self.executor.run(tool.as_ref(), &pending.call).await;
                self.record_run(&pending.call.name, &run, &mut ctx);
                session.transcript.push(run.turn);
                ctx.transitions.push(Transition::Stay);
            }
            Decision::Reject => {
                session
                    .transcript
                    .push(Turn::tool_ok(&pending.call.id, json!(prompts::DECLINED_NOTICE)));
                self.leave(session, &mut ctx);
            }
        }
        self.drive(session, &mut ctx).await
    }

    async fn compact_if_needed(&self, session: &mut Session) {
        let before = session.transcript.len();
        match self.compactor.maybe_compact(session).await {
            Ok(true) => self.emit(EngineEvent::Compacted {
                dropped: before.saturating_sub(session.transcript.len()),
            }),
            Ok(false) => {}
            Err(e) => {
                // 摘要失败不影响本轮，下次超过阈值时重试
                if let RecoveryAction::Defer = self.recovery.handle(&e) {
                    tracing::warn!(session = %session.id, error = %e, "compaction deferred");
                }
                self.emit(EngineEvent::Recovery {
                    action: "defer".to_string(),
                    detail: e.to_string(),
                });
            }
        }
    }

    async fn drive(&self, session: &mut Session, ctx: &mut TurnCtx) -> Result<TurnReport, AgentError> {
        loop {
            if ctx.steps >= self.limits.max_steps {
                return Ok(self.apologize(session, ctx, "step limit reached"));
            }
            ctx.steps += 1;
            self.emit(EngineEvent::StepUpdate {
                step: ctx.steps,
                max_steps: self.limits.max_steps,
            });

            let profile = self.agents.get(session.stack.top())?;

            if profile.kind == AgentKind::Reflect {
                let request = last_suggestion_request(&session.transcript);
                let outcome = match self.reflect.run(profile, &request).await {
                    Ok(o) => o,
                    Err(e) => {
                        // 反思状态只属于本次运行，失败后回到父助手，下一轮重新读取用户输入
                        self.leave(session, ctx);
                        return self.port_failure(session, ctx, e);
                    }
                };
                if let Some(reply) = self.finish_reflection(session, ctx, outcome) {
                    return Ok(Self::report(ctx, Some(reply), TurnOutcome::Completed));
                }
                continue;
            }

            let completion = match self.complete(session, profile).await {
                Ok(Some(c)) => c,
                Ok(None) => return Ok(self.apologize(session, ctx, "no usable answer after re-prompting")),
                Err(e) => return self.port_failure(session, ctx, e),
            };

            if completion.tool_calls.is_empty() {
                let text = completion.text_or_empty().trim().to_string();
                session.transcript.push(Turn::agent(text.clone()));
                ctx.transitions.push(if session.stack.depth() == 1 {
                    Transition::Terminate
                } else {
                    Transition::Stay
                });
                self.emit(EngineEvent::MessageDone { text: text.clone() });
                return Ok(Self::report(ctx, Some(text), TurnOutcome::Completed));
            }

            match self.dispatch(session, profile, completion, ctx).await? {
                Flow::Suspended(pending) => {
                    return Ok(Self::report(ctx, None, TurnOutcome::AwaitingConfirmation(pending)));
                }
                Flow::Reply(text) => {
                    self.emit(EngineEvent::MessageDone { text: text.clone() });
                    return Ok(Self::report(ctx, Some(text), TurnOutcome::Completed));
                }
                Flow::Continue => {
                    if ctx.validation_failures > self.limits.max_validation_attempts {
                        return Ok(self.apologize(session, ctx, "too many invalid tool calls"));
                    }
                }
            }
        }
    }

    /// 调用补全端口；不合格的回答（空白，或仅工具助手给出纯文本）注入纠正提示后重试，纠正提示不写入记录
    async fn complete(&self, session: &Session, profile: &AgentProfile) -> Result<Option<Completion>, AgentError> {
        let mut turns = request_turns(session, profile);
        let nudge = if profile.tool_call_only {
            prompts::TOOL_CALL_NUDGE
        } else {
            prompts::BLANK_ANSWER_NUDGE
        };

        for attempt in 0..=self.limits.max_reprompts {
            self.emit(EngineEvent::Thinking { agent: profile.id });
            let completion = self
                .port
                .complete(&turns, profile.specs(), profile.tool_choice)
                .await?;
            let usable = if profile.tool_call_only {
                !completion.tool_calls.is_empty()
            } else {
                !completion.is_blank()
            };
            if usable {
                return Ok(Some(completion));
            }
            tracing::warn!(agent = %profile.id, attempt, "unusable answer, re-prompting");
            self.emit(EngineEvent::Recovery {
                action: "retry_with_prompt".to_string(),
                detail: nudge.to_string(),
            });
            turns.push(Turn::user(nudge));
        }
        Ok(None)
    }

    async fn dispatch(
        &self,
        session: &mut Session,
        profile: &AgentProfile,
        completion: Completion,
        ctx: &mut TurnCtx,
    ) -> Result<Flow, AgentError> {
        let calls = normalize_ids(completion.tool_calls);
        let text = completion.text.unwrap_or_default();
        session
            .transcript
            .push(Turn::agent_with_calls(text.clone(), calls.clone()));

        let mut flow: Option<Flow> = None;
        // 入栈通知必须排在本条回复的全部 ToolResult 之后
        let mut announcements: Vec<Turn> = Vec::new();

        for call in &calls {
            if flow.is_some() {
                session.transcript.push(Turn::tool_err(&call.id, prompts::SKIPPED_CALL));
                continue;
            }
            match profile.route(&call.name) {
                None => {
                    let err = AgentError::ValidationError(format!(
                        "unknown tool `{}` for {}",
                        call.name, profile.id
                    ));
                    self.reject_call(session, ctx, call, &err);
                }
                Some(ToolRoute::Safe(tool)) => {
                    self.emit(EngineEvent::ToolCall {
                        tool: call.name.clone(),
                        args: call.args.clone(),
                    });
                    let run = self.executor.run(tool.as_ref(), call).await;
                    self.record_run(&call.name, &run, ctx);
                    session.transcript.push(run.turn);
                }
                Some(ToolRoute::Sensitive(_)) => {
                    ConfirmationGate::suspend(session, profile.id, call.clone())?;
                    self.emit(EngineEvent::ConfirmationRequired {
                        tool: call.name.clone(),
                        args: call.args.clone(),
                    });
                    if let Some(p) = session.pending.clone() {
                        flow = Some(Flow::Suspended(p));
                    }
                }
                Some(ToolRoute::Enter(target)) => {
                    let target = *target;
                    if session.stack.contains(target) {
                        let err = AgentError::ValidationError(format!("{target} is already active"));
                        self.reject_call(session, ctx, call, &err);
                        continue;
                    }
                    session
                        .transcript
                        .push(Turn::tool_ok(&call.id, json!({"status": "delegated", "agent": target})));
                    announcements.push(Turn::internal(prompts::entry_notice(target.display_name())));
                    session.stack = session.stack.push(target);
                    ctx.transitions.push(Transition::Enter(target));
                    self.emit(EngineEvent::Handoff {
                        from: profile.id,
                        to: target,
                    });
                    flow = Some(Flow::Continue);
                }
                Some(ToolRoute::Finalize) => {
                    let args: CompleteOrEscalate = match parse_args(call.args.clone()) {
                        Ok(args) => args,
                        Err(e) => {
                            let err = AgentError::ValidationError(format!("{FINALIZE_TOOL}: {e}"));
                            self.reject_call(session, ctx, call, &err);
                            continue;
                        }
                    };
                    if session.stack.depth() > 1 {
                        session.transcript.push(Turn::tool_ok(
                            &call.id,
                            json!({
                                "notice": prompts::HAND_BACK_NOTICE,
                                "cancel": args.cancel,
                                "reason": args.reason,
                            }),
                        ));
                        self.leave(session, ctx);
                        flow = Some(Flow::Continue);
                    } else {
                        session.transcript.push(Turn::tool_ok(&call.id, json!(args.reason)));
                        ctx.transitions.push(Transition::Terminate);
                        let reply = if text.trim().is_empty() {
                            args.reason
                        } else {
                            text.clone()
                        };
                        flow = Some(Flow::Reply(reply));
                    }
                }
            }
        }

        session.transcript.extend(announcements);
        Ok(flow.unwrap_or(Flow::Continue))
    }

    fn reject_call(&self, session: &mut Session, ctx: &mut TurnCtx, call: &ToolCall, err: &AgentError) {
        ctx.validation_failures += 1;
        tracing::warn!(tool = %call.name, error = %err, "invalid tool call");
        self.emit(EngineEvent::ToolFailure {
            tool: call.name.clone(),
            reason: err.to_string(),
        });
        session
            .transcript
            .push(Turn::tool_err(&call.id, self.executor.error_text(err)));
    }

    fn record_run(&self, tool: &str, run: &ToolRun, ctx: &mut TurnCtx) {
        match &run.error {
            Some(err) => {
                if matches!(err, AgentError::ValidationError(_)) {
                    ctx.validation_failures += 1;
                }
                self.emit(EngineEvent::ToolFailure {
                    tool: tool.to_string(),
                    reason: err.to_string(),
                });
            }
            None => {
                if let Turn::ToolResult { payload, .. } = &run.turn {
                    self.emit(EngineEvent::Observation {
                        tool: tool.to_string(),
                        preview: preview(&payload.to_string(), 200),
                    });
                }
            }
        }
    }

    /// 推荐结果写成一次 finalize 调用及其结果，然后交回父助手；已在根部时直接作为回复
    fn finish_reflection(&self, session: &mut Session, ctx: &mut TurnCtx, outcome: ReflectOutcome) -> Option<String> {
        let call = ToolCall::new(
            uuid::Uuid::new_v4().to_string(),
            FINALIZE_TOOL,
            json!({"cancel": outcome.cancel, "reason": outcome.reason}),
        );
        session
            .transcript
            .push(Turn::agent_with_calls("", vec![call.clone()]));
        session.transcript.push(Turn::tool_ok(
            &call.id,
            json!({
                "notice": prompts::HAND_BACK_NOTICE,
                "cancel": outcome.cancel,
                "reason": outcome.reason,
                "suggested_foods": outcome.candidates,
            }),
        ));
        if self.leave(session, ctx) {
            None
        } else {
            ctx.transitions.push(Transition::Terminate);
            Some(outcome.reason)
        }
    }

    fn leave(&self, session: &mut Session, ctx: &mut TurnCtx) -> bool {
        let from = session.stack.top();
        match session.stack.pop() {
            Some(parent) => {
                session.stack = parent;
                ctx.transitions.push(Transition::Leave);
                self.emit(EngineEvent::Handoff {
                    from,
                    to: session.stack.top(),
                });
                true
            }
            None => false,
        }
    }

    fn port_failure(&self, session: &mut Session, ctx: &mut TurnCtx, err: AgentError) -> Result<TurnReport, AgentError> {
        match self.recovery.handle(&err) {
            RecoveryAction::Apologize => Ok(self.apologize(session, ctx, &err.to_string())),
            _ => Err(err),
        }
    }

    fn apologize(&self, session: &mut Session, ctx: &mut TurnCtx, reason: &str) -> TurnReport {
        tracing::warn!(session = %session.id, agent = %session.stack.top(), reason, "turn failed");
        session.transcript.push(Turn::agent(APOLOGY));
        self.emit(EngineEvent::Error {
            text: reason.to_string(),
        });
        Self::report(ctx, Some(APOLOGY.to_string()), TurnOutcome::Failed(reason.to_string()))
    }

    fn report(ctx: &mut TurnCtx, reply: Option<String>, outcome: TurnOutcome) -> TurnReport {
        TurnReport {
            reply,
            transitions: std::mem::take(&mut ctx.transitions),
            outcome,
        }
    }

    fn emit(&self, ev: EngineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

/// 系统提示 + 校验后的记录视图；主助手的提示附带当前时间与滚动摘要
fn request_turns(session: &Session, profile: &AgentProfile) -> Vec<Turn> {
    let system = match profile.id {
        AgentId::Primary => prompts::primary_with_context(session.summary.as_deref(), chrono::Local::now()),
        _ => profile.prompt.clone(),
    };
    let view = session.transcript.validated(FINALIZE_TOOL);
    let mut turns = Vec::with_capacity(view.len() + 1);
    turns.push(Turn::system(system));
    turns.extend(view);
    turns
}

/// 补齐缺失或重复的调用 id
fn normalize_ids(calls: Vec<ToolCall>) -> Vec<ToolCall> {
    let mut seen = HashSet::new();
    calls
        .into_iter()
        .map(|mut c| {
            if c.id.trim().is_empty() || !seen.insert(c.id.clone()) {
                c.id = uuid::Uuid::new_v4().to_string();
                seen.insert(c.id.clone());
            }
            c
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{seed, EntityResolver, InMemoryCatalog, InMemoryOrderStore, OrderStore};
    use crate::llm::{LlmError, ScriptedPort};
    use crate::reflect::state::DRAFT_TOOL;
    use crate::tools::{
        AvailableFoodSearchTool, CancelOrderTool, CheckOrderStatusTool, CommentOrderTool, ToolRegistry,
        CANCEL_ORDER_TOOL, CHECK_ORDER_STATUS_TOOL,
    };

    struct Fixture {
        router: DialogRouter,
        port: Arc<ScriptedPort>,
        orders: Arc<dyn OrderStore>,
    }

    fn fixture_with(limits: RouterLimits) -> Fixture {
        let port = Arc::new(ScriptedPort::new());
        let resolver = Arc::new(EntityResolver::new(Arc::new(InMemoryCatalog::new(seed::foods())), 1));
        let orders: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new(seed::orders()));
        let docs = Arc::new(crate::catalog::DocumentRetriever::new(
            Arc::new(crate::catalog::InMemoryDocuments::new(seed::documents())),
            0.1,
            3,
        ));
        let mut tools = ToolRegistry::new();
        tools.register(AvailableFoodSearchTool::new(resolver));
        tools.register(CancelOrderTool::new(orders.clone()));
        tools.register(CommentOrderTool::new(orders.clone()));
        tools.register(CheckOrderStatusTool::new(orders.clone()));
        tools.register(crate::tools::RetrieveFromDocTool::new(docs));
        let agents = Arc::new(AgentRegistry::standard(&tools).unwrap());
        let dyn_port: Arc<dyn CompletionPort> = port.clone();
        let router = DialogRouter::new(
            agents,
            dyn_port.clone(),
            Arc::new(ToolExecutor::new(5)),
            Compactor::new(dyn_port, 18, 3),
            limits,
        );
        Fixture { router, port, orders }
    }

    fn fixture() -> Fixture {
        fixture_with(RouterLimits::default())
    }

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new(id, name, args)
    }

    #[tokio::test]
    async fn test_primary_text_reply_terminates() {
        let f = fixture();
        f.port.push(Completion::text("Hello! How can I help with food today?"));
        let mut s = Session::new("s");
        let report = f.router.handle_user_turn(&mut s, "hi").await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Completed);
        assert_eq!(report.transitions, vec![Transition::Terminate]);
        assert_eq!(s.transcript.len(), 2);
        let sys = f.port.requests()[0].system_prompt().unwrap().to_string();
        assert!(sys.contains("Conversation summary: (none)"));
    }

    #[tokio::test]
    async fn test_delegation_and_hand_back() {
        let f = fixture();
        f.port.push(Completion::with_calls(vec![call(
            "d1",
            "to_order_management",
            json!({"request": "status of order 2"}),
        )]));
        f.port.push(Completion::with_calls(vec![call(
            "c1",
            CHECK_ORDER_STATUS_TOOL,
            json!({"order_id": 2}),
        )]));
        f.port.push(Completion::with_calls(vec![call(
            "f1",
            FINALIZE_TOOL,
            json!({"cancel": false, "reason": "Order 2 was delivered."}),
        )]));
        f.port.push(Completion::text("Your order 2 has been delivered."));

        let mut s = Session::new("s");
        let report = f.router.handle_user_turn(&mut s, "where is order 2?").await.unwrap();
        assert_eq!(report.reply.as_deref(), Some("Your order 2 has been delivered."));
        assert_eq!(
            report.transitions,
            vec![
                Transition::Enter(AgentId::OrderManagement),
                Transition::Leave,
                Transition::Terminate
            ]
        );
        assert_eq!(s.stack.depth(), 1);
        assert!(!s.transcript.has_unmatched_calls(FINALIZE_TOOL));

        let reqs = f.port.requests();
        // 子助手看到自己的提示与内部入栈通知
        assert_eq!(reqs[1].system_prompt(), Some(prompts::ORDER_MANAGEMENT));
        assert!(reqs[1]
            .turns
            .iter()
            .any(|t| matches!(t, Turn::System { internal: true, text } if text.contains("Order Management Assistant"))));
        assert!(reqs[1].tools.contains(&FINALIZE_TOOL.to_string()));
        // 内部通知对用户不可见
        assert!(s.transcript.user_visible().iter().all(|l| !l.contains("Order Management Assistant")));
    }

    #[tokio::test]
    async fn test_sensitive_call_suspends_and_skips_rest() {
        let f = fixture();
        f.port.push(Completion::with_calls(vec![call(
            "d1",
            "to_order_management",
            json!({"request": "cancel order 42, phone 555-1234"}),
        )]));
        f.port.push(Completion::with_calls(vec![
            call("x1", CANCEL_ORDER_TOOL, json!({"order_id": 42, "phone_number": "555-1234"})),
            call("x2", CHECK_ORDER_STATUS_TOOL, json!({"order_id": 42})),
        ]));

        let mut s = Session::new("s");
        let report = f.router.handle_user_turn(&mut s, "cancel order 42").await.unwrap();
        let pending = report.pending().unwrap();
        assert_eq!(pending.call.id, "x1");
        assert_eq!(pending.agent, AgentId::OrderManagement);
        assert!(report.reply.is_none());
        // 尚未执行
        assert_eq!(f.orders.get(42).await.unwrap().unwrap().status, "preparation");
        // 被跳过的调用有 error 结果
        assert!(s.transcript.turns().iter().any(|t| matches!(
            t,
            Turn::ToolResult { tool_call_id, error: Some(_), .. } if tool_call_id == "x2"
        )));

        let err = f.router.handle_user_turn(&mut s, "hello?").await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfirmationState(_)));
    }

    #[tokio::test]
    async fn test_resume_confirm_executes_once() {
        let f = fixture();
        let mut s = Session::new("s");
        s.stack = s.stack.push(AgentId::OrderManagement);
        let pending_call = call("x1", CANCEL_ORDER_TOOL, json!({"order_id": 42, "phone_number": "555-1234"}));
        s.transcript.push(Turn::agent_with_calls("", vec![pending_call.clone()]));
        ConfirmationGate::suspend(&mut s, AgentId::OrderManagement, pending_call).unwrap();

        f.port.push(Completion::with_calls(vec![call(
            "f1",
            FINALIZE_TOOL,
            json!({"cancel": false, "reason": "Order 42 cancelled."}),
        )]));
        f.port.push(Completion::text("Order 42 has been cancelled."));

        let report = f.router.resume(&mut s, Decision::Confirm).await.unwrap();
        assert_eq!(report.reply.as_deref(), Some("Order 42 has been cancelled."));
        assert_eq!(f.orders.get(42).await.unwrap().unwrap().status, "canceled");
        assert!(s.pending.is_none());

        let err = f.router.resume(&mut s, Decision::Confirm).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfirmationState(_)));
    }

    #[tokio::test]
    async fn test_resume_reject_pops_to_parent() {
        let f = fixture();
        let mut s = Session::new("s");
        s.stack = s.stack.push(AgentId::OrderManagement);
        let pending_call = call("x1", CANCEL_ORDER_TOOL, json!({"order_id": 42, "phone_number": "555-1234"}));
        s.transcript.push(Turn::agent_with_calls("", vec![pending_call.clone()]));
        ConfirmationGate::suspend(&mut s, AgentId::OrderManagement, pending_call).unwrap();
        f.port.push(Completion::text("Okay, I left order 42 as it is."));

        let report = f.router.resume(&mut s, Decision::Reject).await.unwrap();
        assert_eq!(report.transitions, vec![Transition::Leave, Transition::Terminate]);
        assert_eq!(s.stack.depth(), 1);
        assert_eq!(f.orders.get(42).await.unwrap().unwrap().status, "preparation");
        assert!(s.transcript.turns().iter().any(|t| matches!(
            t,
            Turn::ToolResult { tool_call_id, payload, .. }
                if tool_call_id == "x1" && payload == &json!(prompts::DECLINED_NOTICE)
        )));
        assert_eq!(f.port.requests()[0].system_prompt().map(|p| p.starts_with(prompts::PRIMARY)), Some(true));
    }

    #[tokio::test]
    async fn test_text_from_tool_only_agent_reprompts_without_storing_nudge() {
        let f = fixture();
        f.port.push(Completion::with_calls(vec![call("d1", "to_food_search", json!({"request": "pizza"}))]));
        f.port.push(Completion::text("Let me look."));
        f.port.push(Completion::with_calls(vec![call(
            "f1",
            FINALIZE_TOOL,
            json!({"cancel": false, "reason": "Pizza at Napoli Express, $10"}),
        )]));
        f.port.push(Completion::text("Napoli Express has Pizza for $10."));

        let mut s = Session::new("s");
        let report = f.router.handle_user_turn(&mut s, "pizza?").await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Completed);
        let third = &f.port.requests()[2];
        assert!(matches!(third.turns.last(), Some(Turn::User { text }) if text == prompts::TOOL_CALL_NUDGE));
        assert!(s
            .transcript
            .turns()
            .iter()
            .all(|t| !matches!(t, Turn::User { text } if text == prompts::TOOL_CALL_NUDGE)));
    }

    #[tokio::test]
    async fn test_reprompt_exhaustion_apologizes() {
        let f = fixture_with(RouterLimits {
            max_reprompts: 1,
            ..RouterLimits::default()
        });
        f.port.push(Completion::text("   "));
        f.port.push(Completion::default());
        let mut s = Session::new("s");
        let report = f.router.handle_user_turn(&mut s, "hi").await.unwrap();
        assert_eq!(report.reply.as_deref(), Some(APOLOGY));
        assert!(matches!(report.outcome, TurnOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_port_failure_apologizes_and_keeps_state() {
        let f = fixture();
        f.port.push_err(LlmError::Unavailable("503".into()));
        let mut s = Session::new("s");
        let report = f.router.handle_user_turn(&mut s, "hi").await.unwrap();
        assert_eq!(report.reply.as_deref(), Some(APOLOGY));
        assert_eq!(s.transcript.turns()[0], Turn::user("hi"));
    }

    #[tokio::test]
    async fn test_unknown_tool_counts_toward_validation_limit() {
        let f = fixture_with(RouterLimits {
            max_validation_attempts: 1,
            ..RouterLimits::default()
        });
        f.port.push(Completion::with_calls(vec![call("u1", "order_pizza", json!({}))]));
        f.port.push(Completion::with_calls(vec![call("u2", "order_pizza", json!({}))]));
        let mut s = Session::new("s");
        let report = f.router.handle_user_turn(&mut s, "order me a pizza").await.unwrap();
        assert!(matches!(report.outcome, TurnOutcome::Failed(_)));
        let second = &f.port.requests()[1];
        assert!(second.turns.iter().any(|t| matches!(
            t,
            Turn::ToolResult { error: Some(e), .. } if e.contains("order_pizza")
        )));
    }

    #[tokio::test]
    async fn test_suggestion_runs_reflection_and_hands_back() {
        let f = fixture();
        f.port.push(Completion::with_calls(vec![call(
            "d1",
            "to_food_suggestion",
            json!({"criteria": "thai", "context": "under $15"}),
        )]));
        f.port.push(Completion::call(
            DRAFT_TOOL,
            json!({"suggested_foods": [{"name": "Pad Thai"}], "reflection": "ok", "search_queries": ["curry"]}),
        ));
        f.port.push(Completion::call(FINALIZE_TOOL, json!({"cancel": false, "reason": "done"})));
        f.port.push(Completion::text("Try Pad Thai from Bangkok Street for $11."));

        let mut s = Session::new("s");
        let report = f.router.handle_user_turn(&mut s, "something thai").await.unwrap();
        assert_eq!(report.transitions.first(), Some(&Transition::Enter(AgentId::FoodSuggestion)));
        assert!(report.transitions.contains(&Transition::Leave));
        assert_eq!(s.stack.depth(), 1);
        let handed_back = s.transcript.turns().iter().find_map(|t| match t {
            Turn::ToolResult { payload, .. } if payload.get("suggested_foods").is_some() => Some(payload.clone()),
            _ => None,
        });
        let payload = handed_back.unwrap();
        assert_eq!(payload["suggested_foods"][0]["source"], "Bangkok Street");
        assert_eq!(payload["suggested_foods"][0]["price"], 11.0);
    }

    #[tokio::test]
    async fn test_reflection_failure_returns_to_parent() {
        let f = fixture();
        f.port.push(Completion::with_calls(vec![call(
            "d1",
            "to_food_suggestion",
            json!({"criteria": "thai"}),
        )]));
        f.port.push_err(LlmError::Unavailable("503".into()));
        let mut s = Session::new("s");
        let report = f.router.handle_user_turn(&mut s, "something thai").await.unwrap();
        assert!(matches!(report.outcome, TurnOutcome::Failed(_)));
        assert_eq!(
            report.transitions,
            vec![Transition::Enter(AgentId::FoodSuggestion), Transition::Leave]
        );
        assert_eq!(s.stack.depth(), 1);

        f.port.push(Completion::text("Order 2 has been delivered."));
        let report = f.router.handle_user_turn(&mut s, "what's the status of order 2?").await.unwrap();
        assert_eq!(report.reply.as_deref(), Some("Order 2 has been delivered."));
        let last = f.port.requests().last().cloned().unwrap();
        assert!(last.tools.iter().any(|t| t == "to_order_management"));
        assert!(!last.tools.iter().any(|t| t == DRAFT_TOOL));
        assert_eq!(last.turns.last(), Some(&Turn::user("what's the status of order 2?")));
    }

    #[tokio::test]
    async fn test_malformed_finalize_is_rejected_and_retried() {
        let f = fixture();
        f.port.push(Completion::with_calls(vec![call(
            "d1",
            "to_order_management",
            json!({"request": "status of order 2"}),
        )]));
        f.port.push(Completion::with_calls(vec![call(
            "f1",
            FINALIZE_TOOL,
            json!({"cancel": "maybe", "oops": 1}),
        )]));
        f.port.push(Completion::with_calls(vec![call(
            "f2",
            FINALIZE_TOOL,
            json!({"cancel": false, "reason": "order 2 delivered"}),
        )]));
        f.port.push(Completion::text("Order 2 was delivered."));

        let mut s = Session::new("s");
        let report = f.router.handle_user_turn(&mut s, "status of order 2").await.unwrap();
        assert_eq!(report.reply.as_deref(), Some("Order 2 was delivered."));
        assert_eq!(
            report.transitions,
            vec![
                Transition::Enter(AgentId::OrderManagement),
                Transition::Leave,
                Transition::Terminate
            ]
        );
        let results: Vec<&Turn> = s
            .transcript
            .turns()
            .iter()
            .filter(|t| matches!(t, Turn::ToolResult { tool_call_id, .. } if tool_call_id.starts_with('f')))
            .collect();
        assert!(matches!(results[0], Turn::ToolResult { error: Some(e), .. } if e.contains(FINALIZE_TOOL)));
        assert!(matches!(
            results[1],
            Turn::ToolResult { payload, error: None, .. } if payload["reason"] == "order 2 delivered"
        ));
    }

    #[tokio::test]
    async fn test_malformed_finalize_counts_toward_validation_limit() {
        let f = fixture_with(RouterLimits {
            max_validation_attempts: 1,
            ..RouterLimits::default()
        });
        f.port.push(Completion::with_calls(vec![call(
            "d1",
            "to_order_management",
            json!({"request": "status of order 2"}),
        )]));
        f.port.push(Completion::with_calls(vec![call("f1", FINALIZE_TOOL, json!({"cancel": "maybe"}))]));
        f.port.push(Completion::with_calls(vec![call("f2", FINALIZE_TOOL, json!({"reason": 7}))]));
        let mut s = Session::new("s");
        let report = f.router.handle_user_turn(&mut s, "status of order 2").await.unwrap();
        assert!(matches!(report.outcome, TurnOutcome::Failed(_)));
        assert!(!report.transitions.contains(&Transition::Leave));
    }

    #[test]
    fn test_normalize_ids() {
        let calls = normalize_ids(vec![
            call("a", "x", json!({})),
            call("a", "y", json!({})),
            call("", "z", json!({})),
        ]);
        let ids: HashSet<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(calls[0].id, "a");
    }
}
