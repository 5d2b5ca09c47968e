//! 助手层：助手标识与分发表、内置助手集合与提示

pub mod profile;
pub mod prompts;
pub mod registry;

pub use profile::{AgentId, AgentKind, AgentProfile, ToolRoute};
pub use registry::AgentRegistry;
