//! available_food_search：按菜名 / 餐厅名在本地目录中模糊查找可点的食物

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::EntityResolver;
use crate::core::AgentError;
use crate::tools::{parse_args, schema_of, Tool, ToolError};

pub const FOOD_SEARCH_TOOL: &str = "available_food_search";

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct FoodSearchArgs {
    /// The name of the food to search for.
    #[serde(default)]
    pub food_name: Option<String>,
    /// The name of the restaurant to search for.
    #[serde(default)]
    pub restaurant_name: Option<String>,
}

pub struct AvailableFoodSearchTool {
    resolver: Arc<EntityResolver>,
}

impl AvailableFoodSearchTool {
    pub fn new(resolver: Arc<EntityResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Tool for AvailableFoodSearchTool {
    fn name(&self) -> &str {
        FOOD_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Searches the local database for available food items. Use this tool when the user is asking for a list \
         of foods they can order locally. Provide food_name, restaurant_name, or both. Returns matching foods \
         with food_name, food_category, restaurant_name, price and edit_distance; an empty list means not found."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<FoodSearchArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: FoodSearchArgs = parse_args(args)?;
        let matches = self
            .resolver
            .resolve_ranked(args.food_name.as_deref(), args.restaurant_name.as_deref())
            .await
            .map_err(|e| match e {
                AgentError::InvalidInput(msg) => ToolError::Validation(msg),
                other => ToolError::Fault(other.to_string()),
            })?;
        let rows: Vec<Value> = matches
            .into_iter()
            .map(|m| {
                serde_json::json!({
                    "id": m.entry.id,
                    "food_name": m.entry.name,
                    "food_category": m.entry.category,
                    "restaurant_name": m.entry.source_name,
                    "price": m.entry.price,
                    "edit_distance": m.edit_distance,
                })
            })
            .collect();
        Ok(Value::Array(rows))
    }
}
