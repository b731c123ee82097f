//! Outbound notifications for trade lifecycle events.
//!
//! Alert delivery is never on the critical path: sinks log their own
//! failures and never propagate them into trading logic.

pub mod telegram;

use async_trait::async_trait;
use tracing::info;

pub use telegram::TelegramAlertSink;

/// Fire-and-forget notification sink.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn push(&self, message: &str);
}

/// Sink that only logs, for paper mode and tests.
#[derive(Debug, Default)]
pub struct NoopAlertSink;

#[async_trait]
impl AlertSink for NoopAlertSink {
    async fn push(&self, message: &str) {
        info!(message, "alert");
    }
}
