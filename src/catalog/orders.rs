//! 订单存储：查询状态、修改备注、取消（仅 preparation 状态且手机号匹配）
//!
//! 这是核心之外唯一有外部副作用的数据；取消操作只能经由确认门执行。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::catalog::SqliteDb;
use crate::core::AgentError;

pub const CANCELLABLE_STATUS: &str = "preparation";
pub const CANCELLED_STATUS: &str = "canceled";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub phone_number: String,
    pub person_name: String,
    pub status: String,
    pub comment: Option<String>,
}

impl Order {
    pub fn new(
        id: i64,
        phone_number: impl Into<String>,
        person_name: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id,
            phone_number: phone_number.into(),
            person_name: person_name.into(),
            status: status.into(),
            comment: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// 订单不存在或手机号不匹配
    NotFound,
    NotCancellable { status: String },
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_id: i64) -> Result<Option<Order>, AgentError>;
    async fn cancel(&self, order_id: i64, phone_number: &str) -> Result<CancelOutcome, AgentError>;
    /// 覆盖备注；订单不存在返回 false
    async fn set_comment(&self, order_id: i64, comment: &str) -> Result<bool, AgentError>;
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<BTreeMap<i64, Order>>,
}

impl InMemoryOrderStore {
    pub fn new(orders: Vec<Order>) -> Self {
        Self {
            orders: RwLock::new(orders.into_iter().map(|o| (o.id, o)).collect()),
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, order_id: i64) -> Result<Option<Order>, AgentError> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn cancel(&self, order_id: i64, phone_number: &str) -> Result<CancelOutcome, AgentError> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order_id) {
            Some(o) if o.phone_number == phone_number => {
                if o.status == CANCELLABLE_STATUS {
                    o.status = CANCELLED_STATUS.to_string();
                    Ok(CancelOutcome::Cancelled)
                } else {
                    Ok(CancelOutcome::NotCancellable {
                        status: o.status.clone(),
                    })
                }
            }
            _ => Ok(CancelOutcome::NotFound),
        }
    }

    async fn set_comment(&self, order_id: i64, comment: &str) -> Result<bool, AgentError> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order_id) {
            Some(o) => {
                o.comment = Some(comment.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// food_orders(id, person_phone_number, person_name, status, comment)
pub struct SqliteOrderStore {
    db: Arc<SqliteDb>,
}

impl SqliteOrderStore {
    pub fn new(db: Arc<SqliteDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn get(&self, order_id: i64) -> Result<Option<Order>, AgentError> {
        self.db
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, person_phone_number, person_name, status, comment FROM food_orders WHERE id = ?1",
                        params![order_id],
                        |row| {
                            Ok(Order {
                                id: row.get(0)?,
                                phone_number: row.get(1)?,
                                person_name: row.get(2)?,
                                status: row.get(3)?,
                                comment: row.get(4)?,
                            })
                        },
                    )
                    .optional()?)
            })
            .await
    }

    async fn cancel(&self, order_id: i64, phone_number: &str) -> Result<CancelOutcome, AgentError> {
        let phone = phone_number.to_string();
        self.db
            .with_conn(move |conn| {
                let status: Option<String> = conn
                    .query_row(
                        "SELECT status FROM food_orders WHERE id = ?1 AND person_phone_number = ?2",
                        params![order_id, phone],
                        |row| row.get(0),
                    )
                    .optional()?;
                match status {
                    None => Ok(CancelOutcome::NotFound),
                    Some(s) if s == CANCELLABLE_STATUS => {
                        conn.execute(
                            "UPDATE food_orders SET status = ?1 WHERE id = ?2",
                            params![CANCELLED_STATUS, order_id],
                        )?;
                        Ok(CancelOutcome::Cancelled)
                    }
                    Some(status) => Ok(CancelOutcome::NotCancellable { status }),
                }
            })
            .await
    }

    async fn set_comment(&self, order_id: i64, comment: &str) -> Result<bool, AgentError> {
        let comment = comment.to_string();
        self.db
            .with_conn(move |conn| {
                let changed = conn.execute(
                    "UPDATE food_orders SET comment = ?1 WHERE id = ?2",
                    params![comment, order_id],
                )?;
                Ok(changed > 0)
            })
            .await
    }
}
