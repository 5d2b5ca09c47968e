//! 核心编排层：错误与恢复、会话监管、编排器与构建器、共享 SQLite 连接

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod sqlite;

pub use builder::{create_port_from_config, EngineBuilder};
pub use error::{AgentError, RecoveryAction};
pub use orchestrator::Orchestrator;
pub use recovery::{RecoveryEngine, APOLOGY};
pub use session_supervisor::{SessionSupervisor, TurnGuard};
pub use sqlite::SharedConnection;
