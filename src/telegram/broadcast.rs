//! Fan-out delivery to stored user ids.
//!
//! Every recipient is attempted regardless of earlier failures; the report
//! carries how many sends landed. Recipients come from a snapshot taken
//! before the loop, so no lock is held across network calls.

use std::future::Future;

use log::{info, warn};
use teloxide::{ApiError, RequestError};

/// Why one delivery failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The recipient blocked the bot
    Blocked,
    Other(String),
}

/// Outcome of a full fan-out pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn total(&self) -> usize {
        self.sent + self.failed
    }
}

/// Distinguish "user blocked the bot" from everything else.
pub fn classify_send_error(err: &RequestError) -> DeliveryError {
    match err {
        RequestError::Api(ApiError::BotBlocked) => DeliveryError::Blocked,
        other => DeliveryError::Other(other.to_string()),
    }
}

/// Deliver to every recipient via `send`, never stopping early.
pub async fn broadcast<F, Fut>(recipients: &[i64], mut send: F) -> BroadcastReport
where
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = Result<(), DeliveryError>>,
{
    let mut report = BroadcastReport { sent: 0, failed: 0 };
    for &user_id in recipients {
        match send(user_id).await {
            Ok(()) => report.sent += 1,
            Err(DeliveryError::Blocked) => {
                report.failed += 1;
                warn!("Користувач заблокував бота: {}", user_id);
            }
            Err(DeliveryError::Other(reason)) => {
                report.failed += 1;
                warn!("Не вдалося надіслати користувачу {}: {}", user_id, reason);
            }
        }
    }
    info!(
        "Broadcast finished: {} sent, {} failed of {}",
        report.sent,
        report.failed,
        report.total()
    );
    report
}
