//! 目录条目与只读目录存储
//!
//! 核心只做整表读取（fetch_all），匹配在 EntityResolver 中完成。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::SqliteDb;
use crate::core::AgentError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
    pub category: String,
    /// 来源（餐厅名），即分组字段
    pub source_name: String,
    pub price: f64,
}

impl CatalogEntry {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        category: impl Into<String>,
        source_name: impl Into<String>,
        price: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            category: category.into(),
            source_name: source_name.into(),
            price,
        }
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<CatalogEntry>, AgentError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    entries: Vec<CatalogEntry>,
}

impl InMemoryCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn fetch_all(&self) -> Result<Vec<CatalogEntry>, AgentError> {
        Ok(self.entries.clone())
    }
}

/// foods(id, food_name, food_category, restaurant_name, price)
pub struct SqliteCatalog {
    db: Arc<SqliteDb>,
}

impl SqliteCatalog {
    pub fn new(db: Arc<SqliteDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn fetch_all(&self) -> Result<Vec<CatalogEntry>, AgentError> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, food_name, food_category, restaurant_name, price FROM foods ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(CatalogEntry {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            category: row.get(2)?,
                            source_name: row.get(3)?,
                            price: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}
