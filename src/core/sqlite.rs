//! 共享 SQLite 连接：目录库与会话检查点共用
//!
//! rusqlite 为同步 API，连接放在 Mutex 中，查询一律在 spawn_blocking 中执行。

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::core::AgentError;

#[derive(Clone)]
pub struct SharedConnection {
    conn: Arc<Mutex<Connection>>,
}

impl SharedConnection {
    /// 打开（或创建）数据库文件，必要时创建父目录，再执行 init（建表、写入种子数据）
    pub fn open<F>(path: impl AsRef<Path>, init: F) -> Result<Self, AgentError>
    where
        F: FnOnce(&Connection) -> Result<(), AgentError>,
    {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| AgentError::Store(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn with_conn<T, F>(&self, f: F) -> Result<T, AgentError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, AgentError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| AgentError::Store(format!("sqlite lock poisoned: {e}")))?;
            f(&guard)
        })
        .await
        .map_err(|e| AgentError::Store(e.to_string()))?
    }
}
