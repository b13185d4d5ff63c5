//! Telegram bot integration and handlers

pub mod bot;
pub mod broadcast;
pub mod handlers;

// Re-exports for convenience
pub use bot::{create_bot, Command};
pub use handlers::{schema, HandlerDeps, HandlerError};
