//! 对话层：助手栈、确认门、过程事件与路由循环

pub mod events;
pub mod gate;
pub mod router;
pub mod stack;

pub use events::EngineEvent;
pub use gate::{ConfirmationGate, Decision, GateState, PendingConfirmation};
pub use router::{DialogRouter, RouterLimits, TurnOutcome, TurnReport};
pub use stack::{DialogStack, Transition};
