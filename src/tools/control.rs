//! 控制类工具：子助手进入（to_*）与结束 / 上交（complete_or_escalate）
//!
//! 这些工具不执行处理函数，只驱动助手栈的 push / pop，因此只提供签名与参数结构。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{schema_of, ToolSpec};

pub const FINALIZE_TOOL: &str = "complete_or_escalate";

/// 结束当前子任务或上交给主助手
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompleteOrEscalate {
    /// false：任务完成；true：无法处理、离题或需要主助手接手
    #[serde(default)]
    pub cancel: bool,
    /// 完成情况摘要或上交原因
    #[serde(default)]
    pub reason: String,
}

/// 委派给子助手时携带的用户诉求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DelegationArgs {
    /// The user's request, restated with every detail the specialist needs (ids, names, phone numbers, preferences).
    pub request: String,
}

/// 委派给推荐助手：口味 / 偏好与附加条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SuggestionArgs {
    /// The user's specific craving or food preference (e.g. spicy, fast food, vegetarian).
    #[serde(default)]
    pub criteria: String,
    /// Additional context such as price range, ingredients or location; empty when not applicable.
    #[serde(default)]
    pub context: Option<String>,
}

pub fn finalize_spec() -> ToolSpec {
    ToolSpec::new(
        FINALIZE_TOOL,
        "Finalize the current task or escalate it back to the host assistant. \
         Use cancel=false with a short summary when the task is completed; \
         use cancel=true with the reason when the request is off-topic, unsupported, \
         or no solution was found after reasonable attempts.",
        schema_of::<CompleteOrEscalate>(),
    )
}

pub fn delegation_spec(name: &str, description: &str) -> ToolSpec {
    ToolSpec::new(name, description, schema_of::<DelegationArgs>())
}

pub fn suggestion_spec(name: &str, description: &str) -> ToolSpec {
    ToolSpec::new(name, description, schema_of::<SuggestionArgs>())
}
