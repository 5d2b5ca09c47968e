//! 记忆层：对话条目、会话记录与校验、滚动摘要、会话状态与检查点

pub mod checkpoint;
pub mod compactor;
pub mod session;
pub mod transcript;
pub mod turn;

pub use checkpoint::{InMemoryCheckpoint, SessionCheckpoint, SqliteCheckpoint};
pub use compactor::Compactor;
pub use session::Session;
pub use transcript::Transcript;
pub use turn::{ToolCall, Turn};
