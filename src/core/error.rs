use thiserror::Error;

/// Centralized error types for the application
///
/// All errors in the application are converted to this enum for consistent
/// error handling. Uses `thiserror` for automatic conversion and display
/// formatting.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Telegram API errors
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad user input (always recoverable: the step re-prompts)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A record or pagination session that no longer exists
    #[error("Not found: {0}")]
    NotFound(String),

    /// A non-admin identity invoked an admin-only command
    #[error("Permission denied: {0}")]
    Permission(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
