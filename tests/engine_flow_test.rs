//! 引擎端到端流程：委派、确认挂起与恢复、跨重启恢复、取消回滚、会话串行

use std::sync::Arc;
use std::time::Duration;

use concierge::agents::AgentId;
use concierge::config::AppConfig;
use concierge::dialog::Transition;
use concierge::llm::{Completion, CompletionPort, ScriptedPort};
use concierge::memory::{SessionCheckpoint, SqliteCheckpoint, ToolCall, Turn};
use concierge::tools::{CANCEL_ORDER_TOOL, FINALIZE_TOOL};
use concierge::{AgentError, Decision, EngineBuilder, Orchestrator, TurnOutcome};
use serde_json::json;

fn engine(port: Arc<ScriptedPort>, checkpoint: Arc<dyn SessionCheckpoint>) -> Orchestrator {
    let port: Arc<dyn CompletionPort> = port;
    EngineBuilder::new(AppConfig::default())
        .with_port(port)
        .with_checkpoint(checkpoint)
        .build()
        .unwrap()
}

fn calls(id: &str, name: &str, args: serde_json::Value) -> Completion {
    Completion::with_calls(vec![ToolCall::new(id, name, args)])
}

/// 主助手委派给订单助手，订单助手请求取消订单 42
fn script_until_cancel_request(port: &ScriptedPort) {
    port.push(calls(
        "d1",
        "to_order_management",
        json!({"request": "Cancel order 42, phone 555-1234"}),
    ));
    port.push(calls(
        "x1",
        CANCEL_ORDER_TOOL,
        json!({"order_id": 42, "phone_number": "555-1234"}),
    ));
}

fn tool_payload(turns: &[Turn], call_id: &str) -> Option<serde_json::Value> {
    turns.iter().find_map(|t| match t {
        Turn::ToolResult { tool_call_id, payload, .. } if tool_call_id == call_id => Some(payload.clone()),
        _ => None,
    })
}

#[tokio::test]
async fn test_cancel_order_with_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint: Arc<dyn SessionCheckpoint> = Arc::new(SqliteCheckpoint::open(dir.path().join("s.db")).unwrap());
    let port = Arc::new(ScriptedPort::new());
    let engine = engine(port.clone(), checkpoint.clone());

    script_until_cancel_request(&port);
    let report = engine
        .handle_user_turn("u1", "Please cancel order 42, my phone is 555-1234")
        .await
        .unwrap();
    let pending = report.pending().unwrap();
    assert_eq!(pending.call.name, CANCEL_ORDER_TOOL);
    assert_eq!(report.transitions, vec![Transition::Enter(AgentId::OrderManagement)]);

    // 挂起状态已写入检查点
    let stored = checkpoint.load("u1").await.unwrap().unwrap();
    assert_eq!(stored.pending.as_ref().map(|p| p.call.id.as_str()), Some("x1"));
    assert_eq!(stored.stack.top(), AgentId::OrderManagement);

    port.push(calls(
        "f1",
        FINALIZE_TOOL,
        json!({"cancel": false, "reason": "Order 42 has been canceled."}),
    ));
    port.push(Completion::text("Done! Order 42 has been canceled."));
    let report = engine.resume("u1", Decision::Confirm).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert_eq!(report.reply.as_deref(), Some("Done! Order 42 has been canceled."));

    let stored = checkpoint.load("u1").await.unwrap().unwrap();
    assert!(stored.pending.is_none());
    assert_eq!(stored.stack.depth(), 1);
    assert_eq!(
        tool_payload(stored.transcript.turns(), "x1"),
        Some(json!("Order ID 42 from 555-1234 has been successfully canceled."))
    );
    assert!(!stored.transcript.has_unmatched_calls(FINALIZE_TOOL));
}

#[tokio::test]
async fn test_reject_returns_to_primary() {
    let port = Arc::new(ScriptedPort::new());
    let checkpoint: Arc<dyn SessionCheckpoint> = Arc::new(concierge::memory::InMemoryCheckpoint::new());
    let engine = engine(port.clone(), checkpoint);

    script_until_cancel_request(&port);
    engine.handle_user_turn("u2", "cancel order 42, 555-1234").await.unwrap();

    port.push(Completion::text("No problem, order 42 stays as it is."));
    let report = engine.resume("u2", Decision::Reject).await.unwrap();
    assert_eq!(report.reply.as_deref(), Some("No problem, order 42 stays as it is."));

    let session = engine.session("u2").await.unwrap().unwrap();
    assert_eq!(session.stack.depth(), 1);
    assert!(session.pending.is_none());

    // 订单仍在 preparation，可再次查询确认
    port.push(calls("d2", "to_order_management", json!({"request": "status of order 42"})));
    port.push(calls("c1", "check_order_status", json!({"order_id": 42})));
    port.push(calls("f2", FINALIZE_TOOL, json!({"cancel": false, "reason": "in preparation"})));
    port.push(Completion::text("Order 42 is still being prepared."));
    engine.handle_user_turn("u2", "what's the status of 42?").await.unwrap();
    let session = engine.session("u2").await.unwrap().unwrap();
    assert_eq!(
        tool_payload(session.transcript.turns(), "c1"),
        Some(json!("Order ID 42 is currently in 'preparation' status."))
    );
}

#[tokio::test]
async fn test_pending_confirmation_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.db");

    {
        let port = Arc::new(ScriptedPort::new());
        let checkpoint: Arc<dyn SessionCheckpoint> = Arc::new(SqliteCheckpoint::open(&path).unwrap());
        let engine = engine(port.clone(), checkpoint);
        script_until_cancel_request(&port);
        let report = engine.handle_user_turn("u3", "cancel 42 please, 555-1234").await.unwrap();
        assert!(report.pending().is_some());
    }

    let port = Arc::new(ScriptedPort::new());
    let checkpoint: Arc<dyn SessionCheckpoint> = Arc::new(SqliteCheckpoint::open(&path).unwrap());
    let engine = engine(port.clone(), checkpoint);

    // 仍在等待确认：普通输入被拒绝
    let err = engine.handle_user_turn("u3", "hello?").await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidConfirmationState(_)));

    port.push(calls("f1", FINALIZE_TOOL, json!({"cancel": false, "reason": "canceled"})));
    port.push(Completion::text("Your order 42 is canceled."));
    let report = engine.resume("u3", Decision::Confirm).await.unwrap();
    assert_eq!(report.reply.as_deref(), Some("Your order 42 is canceled."));

    // 只能消费一次
    let err = engine.resume("u3", Decision::Confirm).await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidConfirmationState(_)));
}

#[tokio::test]
async fn test_cancel_discards_working_copy() {
    let port = Arc::new(ScriptedPort::with_delay(Duration::from_secs(5)));
    port.push(Completion::text("too late"));
    let checkpoint: Arc<dyn SessionCheckpoint> = Arc::new(concierge::memory::InMemoryCheckpoint::new());
    let engine = Arc::new(engine(port.clone(), checkpoint.clone()));

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.handle_user_turn("u4", "hi").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // 同一会话同时只允许一个轮次
    let busy = engine.handle_user_turn("u4", "hello again").await.unwrap_err();
    assert!(matches!(busy, AgentError::SessionBusy(_)));

    assert!(engine.cancel("u4"));
    let result = running.await.unwrap();
    assert!(matches!(result, Err(AgentError::Cancelled)));

    assert!(checkpoint.load("u4").await.unwrap().is_none());
    assert!(!engine.supervisor().is_active("u4"));
}

#[tokio::test]
async fn test_resume_without_pending_is_rejected() {
    let port = Arc::new(ScriptedPort::new());
    let checkpoint: Arc<dyn SessionCheckpoint> = Arc::new(concierge::memory::InMemoryCheckpoint::new());
    let engine = engine(port.clone(), checkpoint);

    let err = engine.resume("nobody", Decision::Reject).await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidConfirmationState(_)));

    port.push(Completion::text("Hi! What would you like to eat?"));
    engine.handle_user_turn("u5", "hi").await.unwrap();
    let err = engine.resume("u5", Decision::Confirm).await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidConfirmationState(_)));
}

#[tokio::test]
async fn test_long_conversation_is_compacted() {
    let port = Arc::new(ScriptedPort::new());
    let checkpoint: Arc<dyn SessionCheckpoint> = Arc::new(concierge::memory::InMemoryCheckpoint::new());
    let engine = engine(port.clone(), checkpoint);

    // 每轮 2 条；第 10 轮的用户输入使条数达到 19
    for i in 0..9 {
        port.push(Completion::text(format!("reply {i}")));
        engine.handle_user_turn("u6", &format!("message {i}")).await.unwrap();
    }
    port.push(Completion::text("The user chatted about food nine times."));
    port.push(Completion::text("reply 9"));
    engine.handle_user_turn("u6", "message 9").await.unwrap();

    let session = engine.session("u6").await.unwrap().unwrap();
    assert_eq!(session.summary.as_deref(), Some("The user chatted about food nine times."));
    assert_eq!(session.transcript.len(), 4);
    let last = port.requests().last().cloned().unwrap();
    assert!(last
        .system_prompt()
        .unwrap()
        .contains("The user chatted about food nine times."));
}
