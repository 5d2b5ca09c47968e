//! 工具层：Tool trait、注册表、执行器（超时 / 错误转条目 / 审计）、参数 schema 与具体工具

pub mod control;
pub mod docs;
pub mod executor;
pub mod food;
pub mod orders;
pub mod registry;
pub mod schema;
pub mod web_search;

pub use control::{
    delegation_spec, finalize_spec, suggestion_spec, CompleteOrEscalate, DelegationArgs, SuggestionArgs,
    FINALIZE_TOOL,
};
pub use docs::{RetrieveFromDocTool, NO_RESULT, RETRIEVE_DOC_TOOL};
pub use executor::{ToolExecutor, ToolRun};
pub use food::{AvailableFoodSearchTool, FoodSearchArgs, FOOD_SEARCH_TOOL};
pub use orders::{
    CancelOrderTool, CheckOrderStatusTool, CommentOrderTool, CANCEL_ORDER_TOOL, CHECK_ORDER_STATUS_TOOL,
    COMMENT_ORDER_TOOL,
};
pub use registry::{Tool, ToolError, ToolRegistry, ToolSpec};
pub use schema::{parse_args, schema_of};
pub use web_search::{WebSearchTool, WEB_SEARCH_TOOL};
