//! 滚动摘要：会话记录超过阈值时，将旧条目并入 summary 并裁掉
//!
//! 摘要只增不减：新摘要比旧摘要短时拼接在旧摘要之后。摘要失败不影响本轮，下次触发时重试。

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::{CompletionPort, ToolChoice};
use crate::memory::{Session, Turn};

const SUMMARY_SYSTEM_PROMPT: &str = "You condense conversations between a user and a food delivery assistant. \
Keep order ids, phone numbers, names, foods, prices and any decisions the user made. \
Reply with the summary text only.";

/// 摘要器：阈值与保留条数来自 [engine] 配置
pub struct Compactor {
    port: Arc<dyn CompletionPort>,
    threshold: usize,
    keep: usize,
}

impl Compactor {
    pub fn new(port: Arc<dyn CompletionPort>, threshold: usize, keep: usize) -> Self {
        Self { port, threshold, keep }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn should_compact(&self, session: &Session) -> bool {
        session.transcript.len() > self.threshold
    }

    /// 超过阈值时摘要；返回是否发生了裁剪
    pub async fn maybe_compact(&self, session: &mut Session) -> Result<bool, AgentError> {
        if !self.should_compact(session) {
            return Ok(false);
        }
        self.compact_now(session).await
    }

    /// 强制摘要（不看阈值）；条目数不超过 keep 时为空操作
    pub async fn compact_now(&self, session: &mut Session) -> Result<bool, AgentError> {
        let len = session.transcript.len();
        if len <= self.keep {
            return Ok(false);
        }
        let older = &session.transcript.turns()[..len - self.keep];
        let instruction = summary_instruction(session.summary.as_deref(), older);

        let request = [Turn::system(SUMMARY_SYSTEM_PROMPT), Turn::user(instruction)];
        let completion = self
            .port
            .complete(&request, &[], ToolChoice::Auto)
            .await
            .map_err(|e| AgentError::CompactionFailure(e.to_string()))?;

        let fresh = completion.text_or_empty().trim().to_string();
        if fresh.is_empty() {
            return Err(AgentError::CompactionFailure("empty summary".to_string()));
        }

        let merged = match session.summary.take() {
            Some(old) if fresh.chars().count() < old.chars().count() => format!("{old}\n{fresh}"),
            _ => fresh,
        };
        session.summary = Some(merged);
        let dropped = session.transcript.prune_keep_last(self.keep);
        tracing::info!(session = %session.id, dropped = dropped.len(), "transcript compacted");
        Ok(true)
    }
}

fn summary_instruction(existing: Option<&str>, turns: &[Turn]) -> String {
    let body: Vec<String> = turns.iter().map(Turn::render).collect();
    match existing {
        Some(summary) if !summary.is_empty() => format!(
            "This is summary of the conversation to date: {summary}\n\n\
             Extend the summary by taking into account the new messages below:\n{}",
            body.join("\n")
        ),
        _ => format!("Create a summary of the conversation below:\n{}", body.join("\n")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, LlmError, ScriptedPort};

    fn session_with(n: usize) -> Session {
        let mut s = Session::new("s1");
        for i in 0..n {
            s.transcript.push(Turn::user(format!("message {i}")));
        }
        s
    }

    #[tokio::test]
    async fn test_below_threshold_no_call() {
        let port = Arc::new(ScriptedPort::new());
        let c = Compactor::new(port.clone(), 18, 3);
        let mut s = session_with(18);
        assert!(!c.maybe_compact(&mut s).await.unwrap());
        assert!(port.requests().is_empty());
    }

    #[tokio::test]
    async fn test_compacts_and_keeps_last_three() {
        let port = Arc::new(ScriptedPort::new());
        port.push(Completion::text("User asked about pizzas."));
        let c = Compactor::new(port.clone(), 18, 3);
        let mut s = session_with(19);
        assert!(c.maybe_compact(&mut s).await.unwrap());
        assert_eq!(s.transcript.len(), 3);
        assert_eq!(s.transcript.turns()[0], Turn::user("message 16"));
        assert_eq!(s.summary.as_deref(), Some("User asked about pizzas."));
        let req = &port.requests()[0];
        assert!(matches!(&req.turns[1], Turn::User { text } if text.starts_with("Create a summary")));
    }

    #[tokio::test]
    async fn test_extends_existing_summary_and_never_shrinks() {
        let port = Arc::new(ScriptedPort::new());
        port.push(Completion::text("short"));
        let c = Compactor::new(port.clone(), 18, 3);
        let mut s = session_with(20);
        s.summary = Some("An earlier, much longer summary".to_string());
        c.compact_now(&mut s).await.unwrap();
        let summary = s.summary.clone().unwrap();
        assert!(summary.starts_with("An earlier, much longer summary"));
        assert!(summary.ends_with("short"));
        let req = &port.requests()[0];
        assert!(matches!(&req.turns[1], Turn::User { text } if text.contains("Extend the summary")));
    }

    #[tokio::test]
    async fn test_failure_leaves_session_untouched() {
        let port = Arc::new(ScriptedPort::new());
        port.push_err(LlmError::Unavailable("down".into()));
        port.push(Completion::text("   "));
        let c = Compactor::new(port.clone(), 18, 3);
        let mut s = session_with(19);
        let before = s.clone();
        assert!(matches!(c.maybe_compact(&mut s).await, Err(AgentError::CompactionFailure(_))));
        assert!(matches!(c.maybe_compact(&mut s).await, Err(AgentError::CompactionFailure(_))));
        assert_eq!(s.transcript, before.transcript);
        assert_eq!(s.summary, before.summary);
    }

    #[tokio::test]
    async fn test_second_compaction_without_new_turns_is_noop() {
        let port = Arc::new(ScriptedPort::new());
        port.push(Completion::text("summary one"));
        let c = Compactor::new(port.clone(), 18, 3);
        let mut s = session_with(19);
        c.compact_now(&mut s).await.unwrap();
        let first = s.summary.clone();
        assert!(!c.compact_now(&mut s).await.unwrap());
        assert_eq!(s.summary, first);
        assert_eq!(port.requests().len(), 1);
    }
}
