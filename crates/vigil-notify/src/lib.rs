//! Outbound chat notification delivery.
//!
//! Alert lifecycle events are rendered into text messages and pushed
//! through one or more [`NotificationChannel`] implementations. Delivery
//! is best effort throughout: every failure is logged and swallowed, so a
//! broken channel can never affect ingestion or lifecycle handling.

pub mod channels;
pub mod manager;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;

/// A delivery channel for rendered notification text (e.g. a Telegram
/// bot). Implementations are wired into the
/// [`manager::NotificationManager`] at startup.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers the message. Errors bubble to the manager, which logs and
    /// drops them.
    async fn send(&self, text: &str) -> Result<()>;

    /// Channel type name for logs (e.g. `"telegram"`).
    fn channel_name(&self) -> &str;
}
