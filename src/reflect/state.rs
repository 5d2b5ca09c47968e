//! 反思循环状态与模型输出结构

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::CatalogEntry;

pub const DRAFT_TOOL: &str = "food_recommendation";
pub const REVISE_TOOL: &str = "revise_food_recommendation";

/// 经目录核实的候选：名称、价格、来源（餐厅）只取自目录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub price: f64,
    pub source: String,
}

impl From<&CatalogEntry> for Candidate {
    fn from(e: &CatalogEntry) -> Self {
        Self {
            name: e.name.clone(),
            price: e.price,
            source: e.source_name.clone(),
        }
    }
}

/// 模型提议的菜品；price 只作参考，候选价格一律取自目录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProposedFood {
    /// Name of the dish.
    pub name: String,
    /// Restaurant serving the dish, when known.
    #[serde(default)]
    pub restaurant: Option<String>,
    /// Price as the model believes it; replaced by the catalog price on verification.
    #[serde(default)]
    pub price: Option<Value>,
}

/// Draft / Revise 两个阶段共用的输出结构
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FoodRecommendation {
    /// The dishes proposed to the user.
    #[serde(default)]
    pub suggested_foods: Vec<ProposedFood>,
    /// Critique of the current list against the user's criteria.
    #[serde(default)]
    pub reflection: String,
    /// At most one focused search query (dish or category name) to find better options.
    #[serde(default)]
    pub search_queries: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReflectionState {
    pub iteration: u32,
    pub candidates: Vec<Candidate>,
    pub critique: String,
    pub refinement_queries: Vec<String>,
}

/// 一次 Execute 的证据：核实的候选 + 细化查询命中
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Evidence {
    pub verified: Vec<Candidate>,
    pub query_hits: Vec<QueryHits>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHits {
    pub query: String,
    pub matches: Vec<Candidate>,
}

/// 循环最终结果，交由路由写回记录并弹栈
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectOutcome {
    pub cancel: bool,
    pub reason: String,
    pub candidates: Vec<Candidate>,
    pub iterations: u32,
}

/// 工具返回的行（available_food_search 输出）转回目录条目
pub(crate) fn entry_from_row(row: &Value) -> Option<CatalogEntry> {
    Some(CatalogEntry::new(
        row.get("id")?.as_i64()?,
        row.get("food_name")?.as_str()?,
        row.get("food_category").and_then(Value::as_str).unwrap_or_default(),
        row.get("restaurant_name")?.as_str()?,
        row.get("price")?.as_f64()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_from_row() {
        let row = json!({"id": 3, "food_name": "Pizza", "food_category": "Pizza",
                         "restaurant_name": "Napoli Express", "price": 10.0, "edit_distance": 0});
        let c = Candidate::from(&entry_from_row(&row).unwrap());
        assert_eq!(c.source, "Napoli Express");
        assert_eq!(c.price, 10.0);
        assert!(entry_from_row(&json!({"food_name": "x"})).is_none());
    }

    #[test]
    fn test_recommendation_ignores_model_price() {
        let r: FoodRecommendation = serde_json::from_value(json!({
            "suggested_foods": [{"name": "Pad Thai", "price": "$3", "restaurant": "Bangkok Street"}],
            "reflection": "ok"
        }))
        .unwrap();
        assert_eq!(r.suggested_foods[0].restaurant.as_deref(), Some("Bangkok Street"));
        assert_eq!(r.suggested_foods[0].price, Some(json!("$3")));
        assert!(r.search_queries.is_empty());
    }
}
