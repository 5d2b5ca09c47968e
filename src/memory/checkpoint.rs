//! 会话检查点：save / load / delete
//!
//! 整个 Session（记录、助手栈、摘要、待确认操作）序列化为一行 JSON，单条语句写入，保证原子性。
//! 内存实现用于测试与无数据库运行；SQLite 实现经 SharedConnection 执行。

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use tokio::sync::RwLock;

use crate::core::{AgentError, SharedConnection};
use crate::memory::Session;

#[async_trait]
pub trait SessionCheckpoint: Send + Sync {
    async fn save(&self, session: &Session) -> Result<(), AgentError>;
    async fn load(&self, session_id: &str) -> Result<Option<Session>, AgentError>;
    async fn delete(&self, session_id: &str) -> Result<(), AgentError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCheckpoint {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionCheckpoint for InMemoryCheckpoint {
    async fn save(&self, session: &Session) -> Result<(), AgentError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Session>, AgentError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<(), AgentError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}

/// SQLite 检查点：sessions(id, state_json, updated_at)
pub struct SqliteCheckpoint {
    conn: SharedConnection,
}

impl SqliteCheckpoint {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let conn = SharedConnection::open(path, |conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS sessions (
                    id TEXT PRIMARY KEY,
                    state_json TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );",
            )?;
            Ok(())
        })?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl SessionCheckpoint for SqliteCheckpoint {
    async fn save(&self, session: &Session) -> Result<(), AgentError> {
        let id = session.id.clone();
        let updated_at = session.updated_at.to_rfc3339();
        let state = serde_json::to_string(session).map_err(|e| AgentError::Store(e.to_string()))?;
        self.conn.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sessions (id, state_json, updated_at) VALUES (?1, ?2, ?3)",
                params![id, state, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn load(&self, session_id: &str) -> Result<Option<Session>, AgentError> {
        let id = session_id.to_string();
        let raw: Option<String> = self
            .conn
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT state_json FROM sessions WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        raw.map(|s| serde_json::from_str(&s).map_err(|e| AgentError::Store(e.to_string())))
            .transpose()
    }

    async fn delete(&self, session_id: &str) -> Result<(), AgentError> {
        let id = session_id.to_string();
        self.conn.with_conn(move |conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }
}
