//! 会话监管：单会话串行、取消令牌
//!
//! 每个会话同一时刻最多一个进行中的轮次；轮次持有 TurnGuard，结束（或被丢弃）时自动释放。
//! cancel(session_id) 触发该轮的 CancellationToken，编排器据此放弃本轮的工作副本。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::core::AgentError;

#[derive(Debug, Default, Clone)]
pub struct SessionSupervisor {
    active: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        // 锁内只有 HashMap 操作，被毒化时直接取回内部数据
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 开始一轮；同一会话已有进行中的轮次时返回 SessionBusy
    pub fn begin(&self, session_id: &str) -> Result<TurnGuard, AgentError> {
        let mut active = self.lock();
        if active.contains_key(session_id) {
            return Err(AgentError::SessionBusy(session_id.to_string()));
        }
        let token = CancellationToken::new();
        active.insert(session_id.to_string(), token.clone());
        Ok(TurnGuard {
            session_id: session_id.to_string(),
            token,
            active: self.active.clone(),
        })
    }

    /// 取消该会话进行中的轮次；没有进行中的轮次时返回 false
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.lock().get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }
}

/// 进行中轮次的凭据；drop 时从监管表移除
#[derive(Debug)]
pub struct TurnGuard {
    session_id: String,
    token: CancellationToken,
    active: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl TurnGuard {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.session_id);
    }
}
