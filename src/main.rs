//! Concierge 终端入口
//!
//! 初始化日志与配置，构建引擎后进入行式对话：
//! 普通输入为一轮对话；/confirm、/reject 回应待确认操作；/compact、/reset、/history、/quit。
//! Ctrl+C 取消进行中的轮次。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use concierge::config::{load_config, AppConfig};
use concierge::dialog::{EngineEvent, PendingConfirmation};
use concierge::observability;
use concierge::{AgentError, Decision, EngineBuilder, Orchestrator, TurnOutcome, TurnReport};
use tokio::io::{AsyncBufReadExt, BufReader};

const SESSION_ID: &str = "local";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let orchestrator: Arc<Orchestrator> = Arc::new(
        EngineBuilder::new(cfg)
            .with_event_tx(event_tx)
            .build()
            .context("Failed to build engine")?,
    );

    // 过程事件只打印工具调用与助手切换
    tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            match ev {
                EngineEvent::ToolCall { tool, .. } => eprintln!("  · {tool}"),
                EngineEvent::Handoff { from, to } => eprintln!("  · {from} -> {to}"),
                _ => {}
            }
        }
    });

    let cancel_handle = orchestrator.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !cancel_handle.cancel(SESSION_ID) {
                eprintln!("(nothing to cancel, type /quit to exit)");
            }
        }
    });

    println!("Food assistant ready. Type /quit to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let result = match input {
            "/quit" | "/exit" => break,
            "/confirm" => orchestrator.resume(SESSION_ID, Decision::Confirm).await.map(Some),
            "/reject" => orchestrator.resume(SESSION_ID, Decision::Reject).await.map(Some),
            "/compact" => orchestrator.compact(SESSION_ID).await.map(|done| {
                println!("{}", if done { "(compacted)" } else { "(nothing to compact)" });
                None
            }),
            "/reset" => orchestrator.reset(SESSION_ID).await.map(|_| {
                println!("(conversation cleared)");
                None
            }),
            "/history" => orchestrator.session(SESSION_ID).await.map(|s| {
                for line in s.map(|s| s.transcript.user_visible()).unwrap_or_default() {
                    println!("{line}");
                }
                None
            }),
            text => orchestrator.handle_user_turn(SESSION_ID, text).await.map(Some),
        };

        match result {
            Ok(Some(report)) => print_report(&report),
            Ok(None) => {}
            Err(AgentError::Cancelled) => println!("(cancelled)"),
            Err(AgentError::InvalidConfirmationState(msg)) => println!("({msg})"),
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                println!("(error: {e})");
            }
        }
    }

    Ok(())
}

fn print_report(report: &TurnReport) {
    if let Some(reply) = &report.reply {
        println!("{reply}");
    }
    if let TurnOutcome::AwaitingConfirmation(pending) = &report.outcome {
        println!("{}", confirmation_prompt(pending));
    }
}

fn confirmation_prompt(pending: &PendingConfirmation) -> String {
    format!(
        "The assistant wants to run {} with {}. Type /confirm to proceed or /reject to decline.",
        pending.call.name, pending.call.args
    )
}
