//! Spysok - single-admin Telegram contact directory bot
//!
//! The admin builds a small phone-book of Telegram users and pages through it
//! with inline navigation; multi-step commands collect their input through a
//! per-chat conversation state machine.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, and logging
//! - `storage`: SQLite-backed record store
//! - `pagination`: listing sessions and page rendering
//! - `flow`: per-chat multi-step input flows
//! - `telegram`: bot commands, dispatcher schema, and broadcast delivery

pub mod core;
pub mod flow;
pub mod pagination;
pub mod storage;
pub mod telegram;

// Re-export commonly used types for convenience
pub use crate::core::{config, AppError, AppResult};
pub use flow::{Flow, FlowAction, FlowRegistry};
pub use pagination::SessionManager;
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
pub use telegram::{create_bot, schema, HandlerDeps};
