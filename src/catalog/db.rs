//! 共享 SQLite 连接（目录 / 订单 / 文档）
//!
//! 首次打开时建表，空库写入示例数据。

use std::path::Path;

use rusqlite::{params, Connection};

use crate::catalog::{seed, CatalogEntry};
use crate::core::{AgentError, SharedConnection};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS foods (
    id INTEGER PRIMARY KEY,
    food_name TEXT NOT NULL,
    food_category TEXT NOT NULL,
    restaurant_name TEXT NOT NULL,
    price REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS food_orders (
    id INTEGER PRIMARY KEY,
    person_phone_number TEXT NOT NULL,
    person_name TEXT NOT NULL,
    status TEXT NOT NULL,
    comment TEXT
);
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    text TEXT NOT NULL
);
";

pub struct SqliteDb {
    conn: SharedConnection,
}

impl SqliteDb {
    /// 打开（或创建）数据库，建表并在空表中写入示例数据
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let conn = SharedConnection::open(path, |conn| {
            conn.execute_batch(SCHEMA)?;
            seed_if_empty(conn)
        })?;
        Ok(Self { conn })
    }

    pub async fn with_conn<T, F>(&self, f: F) -> Result<T, AgentError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, AgentError> + Send + 'static,
    {
        self.conn.with_conn(f).await
    }
}

fn table_is_empty(conn: &Connection, table: &str) -> Result<bool, AgentError> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    Ok(count == 0)
}

fn seed_if_empty(conn: &Connection) -> Result<(), AgentError> {
    if table_is_empty(conn, "foods")? {
        for CatalogEntry {
            id,
            name,
            category,
            source_name,
            price,
        } in seed::foods()
        {
            conn.execute(
                "INSERT INTO foods (id, food_name, food_category, restaurant_name, price) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, name, category, source_name, price],
            )?;
        }
    }
    if table_is_empty(conn, "food_orders")? {
        for o in seed::orders() {
            conn.execute(
                "INSERT INTO food_orders (id, person_phone_number, person_name, status, comment) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![o.id, o.phone_number, o.person_name, o.status, o.comment],
            )?;
        }
    }
    if table_is_empty(conn, "documents")? {
        for (id, text) in seed::documents().into_iter().enumerate() {
            conn.execute(
                "INSERT INTO documents (id, text) VALUES (?1, ?2)",
                params![id as i64 + 1, text],
            )?;
        }
    }
    Ok(())
}
