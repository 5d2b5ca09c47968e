//! 订单工具：check_order_status / comment_order（安全）与 cancel_order（敏感，需确认）
//!
//! 订单不存在等业务结果写入返回文本，不作为错误。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::{CancelOutcome, OrderStore};
use crate::tools::{parse_args, schema_of, Tool, ToolError};

pub const CANCEL_ORDER_TOOL: &str = "cancel_order";
pub const COMMENT_ORDER_TOOL: &str = "comment_order";
pub const CHECK_ORDER_STATUS_TOOL: &str = "check_order_status";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CancelOrderArgs {
    /// ID of the order to cancel
    pub order_id: i64,
    /// Phone number the order was placed with
    pub phone_number: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CommentOrderArgs {
    /// ID of the order to comment on
    pub order_id: i64,
    /// Name of the person leaving the comment
    pub person_name: String,
    /// The comment to add or overwrite
    pub comment: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CheckOrderStatusArgs {
    /// The unique integer identifier of the order
    pub order_id: i64,
}

fn fault(e: crate::core::AgentError) -> ToolError {
    ToolError::Fault(e.to_string())
}

pub struct CancelOrderTool {
    orders: Arc<dyn OrderStore>,
}

impl CancelOrderTool {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl Tool for CancelOrderTool {
    fn name(&self) -> &str {
        CANCEL_ORDER_TOOL
    }

    fn description(&self) -> &str {
        "Cancel an order if its status is 'preparation'. Requires the order id and the phone number the order was placed with."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<CancelOrderArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: CancelOrderArgs = parse_args(args)?;
        let id = args.order_id;
        let phone = args.phone_number.trim();
        let text = match self.orders.cancel(id, phone).await.map_err(fault)? {
            CancelOutcome::Cancelled => {
                tracing::info!(order_id = id, "order cancelled");
                format!("Order ID {id} from {phone} has been successfully canceled.")
            }
            CancelOutcome::NotFound => format!("Order ID {id} from {phone} does not exist."),
            CancelOutcome::NotCancellable { status } => {
                format!("Order ID {id} from {phone} cannot be canceled as it is in '{status}' status.")
            }
        };
        Ok(Value::String(text))
    }
}

pub struct CommentOrderTool {
    orders: Arc<dyn OrderStore>,
}

impl CommentOrderTool {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl Tool for CommentOrderTool {
    fn name(&self) -> &str {
        COMMENT_ORDER_TOOL
    }

    fn description(&self) -> &str {
        "Add or overwrite the comment of an order."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<CommentOrderArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: CommentOrderArgs = parse_args(args)?;
        let id = args.order_id;
        let text = if self.orders.set_comment(id, &args.comment).await.map_err(fault)? {
            format!("Comment for Order ID {id} from {} has been updated.", args.person_name)
        } else {
            format!("Order ID {id} does not exist.")
        };
        Ok(Value::String(text))
    }
}

pub struct CheckOrderStatusTool {
    orders: Arc<dyn OrderStore>,
}

impl CheckOrderStatusTool {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl Tool for CheckOrderStatusTool {
    fn name(&self) -> &str {
        CHECK_ORDER_STATUS_TOOL
    }

    fn description(&self) -> &str {
        "Retrieves the status of a specific order using its unique integer ID. \
         Use it only when the order_id is provided and only to read the status."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<CheckOrderStatusArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: CheckOrderStatusArgs = parse_args(args)?;
        let id = args.order_id;
        let text = match self.orders.get(id).await.map_err(fault)? {
            Some(order) => format!("Order ID {id} is currently in '{}' status.", order.status),
            None => format!("Order ID {id} does not exist."),
        };
        Ok(Value::String(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{seed, InMemoryOrderStore};
    use serde_json::json;

    fn store() -> Arc<dyn OrderStore> {
        Arc::new(InMemoryOrderStore::new(seed::orders()))
    }

    #[tokio::test]
    async fn test_cancel_then_status() {
        let orders = store();
        let cancel = CancelOrderTool::new(orders.clone());
        let status = CheckOrderStatusTool::new(orders);
        let out = cancel
            .execute(json!({"order_id": 42, "phone_number": "555-1234"}))
            .await
            .unwrap();
        assert!(out.as_str().unwrap().contains("successfully canceled"));
        let out = status.execute(json!({"order_id": 42})).await.unwrap();
        assert_eq!(out, json!("Order ID 42 is currently in 'canceled' status."));
    }

    #[tokio::test]
    async fn test_missing_order_reported_in_payload() {
        let comment = CommentOrderTool::new(store());
        let out = comment
            .execute(json!({"order_id": 7, "person_name": "Eve", "comment": "hi"}))
            .await
            .unwrap();
        assert_eq!(out, json!("Order ID 7 does not exist."));
    }

    #[tokio::test]
    async fn test_bad_args_validation() {
        let cancel = CancelOrderTool::new(store());
        let err = cancel.execute(json!({"order_id": "abc"})).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }
}
