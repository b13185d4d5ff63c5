use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Numeric Telegram identity of the single admin
/// Read from ADMIN_ID environment variable; 0 means "not configured"
pub static ADMIN_ID: Lazy<i64> = Lazy::new(|| {
    env::var("ADMIN_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
});

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: contacts.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "contacts.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: spysok.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "spysok.log".to_string()));

/// Pagination configuration
pub mod pagination {
    use super::*;

    /// Max records rendered per listing screen
    pub const DEFAULT_PAGE_SIZE: usize = 20;

    /// Time-to-live of an idle pagination session (seconds)
    pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

    /// Page size, overridable via PAGE_SIZE
    pub static PAGE_SIZE: Lazy<usize> = Lazy::new(|| {
        env::var("PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    });

    /// Session TTL, overridable via SESSION_TTL_SECS
    pub static SESSION_TTL: Lazy<Duration> = Lazy::new(|| {
        let secs = env::var("SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);
        Duration::from_secs(secs)
    });
}

/// Retry configuration for the long-lived polling loop
pub mod retry {
    use super::Duration;

    /// Delay between dispatcher restart attempts (in seconds)
    pub const DISPATCHER_RETRY_DELAY_SECS: u64 = 5;

    /// Dispatcher retry delay duration
    pub fn dispatcher_delay() -> Duration {
        Duration::from_secs(DISPATCHER_RETRY_DELAY_SECS)
    }
}
