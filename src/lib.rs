//! Concierge - 对话式任务委派引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、会话监管、编排器、构建器
//! - **llm**: 补全端口抽象与实现（OpenAI 兼容 / Echo / Scripted）及重试
//! - **memory**: 对话条目、会话记录、滚动摘要、会话状态与检查点
//! - **dialog**: 助手栈、确认门、路由循环、过程事件
//! - **reflect**: 推荐助手的有界反思修订循环
//! - **agents**: 内置助手与提示
//! - **catalog**: 食品目录、模糊解析、订单、文档检索
//! - **tools**: Tool trait、注册表、执行器与具体工具
//! - **observability**: 日志初始化

pub mod agents;
pub mod catalog;
pub mod config;
pub mod core;
pub mod dialog;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod reflect;
pub mod tools;

pub use crate::core::{AgentError, EngineBuilder, Orchestrator};
pub use crate::dialog::{Decision, TurnOutcome, TurnReport};
