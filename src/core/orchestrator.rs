//! 编排器：会话级入口
//!
//! 每轮：监管表登记 -> 从检查点加载（或新建）会话 -> 在工作副本上运行路由 -> 成功或挂起时整体写回。
//! 轮次被取消时工作副本直接丢弃，检查点保持本轮开始前的状态。

use std::sync::Arc;

use crate::core::{AgentError, SessionSupervisor};
use crate::dialog::{Decision, DialogRouter, TurnReport};
use crate::memory::{Session, SessionCheckpoint};

pub struct Orchestrator {
    router: DialogRouter,
    checkpoint: Arc<dyn SessionCheckpoint>,
    supervisor: SessionSupervisor,
}

impl Orchestrator {
    pub fn new(router: DialogRouter, checkpoint: Arc<dyn SessionCheckpoint>) -> Self {
        Self {
            router,
            checkpoint,
            supervisor: SessionSupervisor::new(),
        }
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    /// 处理一条用户输入
    pub async fn handle_user_turn(&self, session_id: &str, text: &str) -> Result<TurnReport, AgentError> {
        let guard = self.supervisor.begin(session_id)?;
        let token = guard.token();
        let mut working = self.load_or_create(session_id).await?;

        let report = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::info!(session = session_id, "turn cancelled, discarding working copy");
                return Err(AgentError::Cancelled);
            }
            result = self.router.handle_user_turn(&mut working, text) => result?,
        };
        self.commit(&mut working).await?;
        Ok(report)
    }

    /// 对挂起的敏感操作给出决定
    pub async fn resume(&self, session_id: &str, decision: Decision) -> Result<TurnReport, AgentError> {
        let guard = self.supervisor.begin(session_id)?;
        let token = guard.token();
        let mut working = self.checkpoint.load(session_id).await?.ok_or_else(|| {
            AgentError::InvalidConfirmationState(format!("session {session_id} has no pending confirmation"))
        })?;

        let report = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::info!(session = session_id, "resume cancelled, confirmation stays pending");
                return Err(AgentError::Cancelled);
            }
            result = self.router.resume(&mut working, decision) => result?,
        };
        self.commit(&mut working).await?;
        Ok(report)
    }

    /// 取消进行中的轮次
    pub fn cancel(&self, session_id: &str) -> bool {
        self.supervisor.cancel(session_id)
    }

    /// 立即摘要（不看阈值）
    pub async fn compact(&self, session_id: &str) -> Result<bool, AgentError> {
        let _guard = self.supervisor.begin(session_id)?;
        let Some(mut working) = self.checkpoint.load(session_id).await? else {
            return Ok(false);
        };
        let compacted = self.router.compactor().compact_now(&mut working).await?;
        if compacted {
            self.commit(&mut working).await?;
        }
        Ok(compacted)
    }

    /// 清空记录、摘要、助手栈与待确认操作
    pub async fn reset(&self, session_id: &str) -> Result<(), AgentError> {
        let _guard = self.supervisor.begin(session_id)?;
        let mut working = self.load_or_create(session_id).await?;
        working.reset();
        self.commit(&mut working).await
    }

    pub async fn end_session(&self, session_id: &str) -> Result<(), AgentError> {
        let _guard = self.supervisor.begin(session_id)?;
        self.checkpoint.delete(session_id).await?;
        tracing::info!(session = session_id, "session ended");
        Ok(())
    }

    pub async fn session(&self, session_id: &str) -> Result<Option<Session>, AgentError> {
        self.checkpoint.load(session_id).await
    }

    async fn load_or_create(&self, session_id: &str) -> Result<Session, AgentError> {
        Ok(self
            .checkpoint
            .load(session_id)
            .await?
            .unwrap_or_else(|| Session::new(session_id)))
    }

    async fn commit(&self, session: &mut Session) -> Result<(), AgentError> {
        session.touch();
        self.checkpoint.save(session).await
    }
}
