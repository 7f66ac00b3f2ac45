//! Ingestion core: connection-health tracking, poll orchestration, and the
//! hook seams the server wires concrete adapters into.
//!
//! The orchestrator owns every piece of mutable poll state (connection
//! tracker, metrics) so multiple instances never share counters and tests
//! can observe them in isolation.

pub mod connection;
pub mod metrics;
pub mod poller;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use vigil_common::types::EventRecord;
use vigil_storage::AlertRow;

pub use connection::{ConnectionStatus, ConnectionTracker};
pub use metrics::{PollMetrics, PollMetricsSnapshot};
pub use poller::{PollOrchestrator, PollOutcome};

/// Fetches the current set of open events from the monitoring source.
///
/// Implementations must be bounded in time: either return a batch or fail
/// within their configured timeout. Each call returns the full current set
/// of open events; there is no pagination cursor.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch_events(&self) -> Result<Vec<EventRecord>>;

    /// Mirror an acknowledge back to the source, best effort. Failures are
    /// logged by the implementation and reported as `false`, never as an
    /// error.
    async fn acknowledge_upstream(
        &self,
        external_id: &str,
        message: &str,
        actor: Option<&str>,
    ) -> bool;
}

/// Realtime event kinds delivered through the [`BroadcastHook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    NewAlert,
    AlertAcknowledged,
    NewAlertsBatch,
    ConnectionStatus,
    ConnectionError,
}

impl BroadcastKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BroadcastKind::NewAlert => "new_alert",
            BroadcastKind::AlertAcknowledged => "alert_acknowledged",
            BroadcastKind::NewAlertsBatch => "new_alerts_batch",
            BroadcastKind::ConnectionStatus => "connection_status",
            BroadcastKind::ConnectionError => "connection_error",
        }
    }
}

impl std::fmt::Display for BroadcastKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fire-and-forget delivery of realtime events. Zero or more subscribers,
/// no delivery guarantee; `emit` must never block or fail.
pub trait BroadcastHook: Send + Sync {
    fn emit(&self, kind: BroadcastKind, payload: serde_json::Value);
}

/// Best-effort outbound notifications. Implementations swallow and log
/// their own failures.
#[async_trait]
pub trait NotificationHook: Send + Sync {
    async fn alert_created(&self, alert: &AlertRow);
    async fn alert_acknowledged(&self, alert: &AlertRow, operator: &str, reason: Option<&str>);
    async fn alert_resolved(&self, alert: &AlertRow);
}

/// No-op hooks for wiring tests or disabled subsystems.
pub struct NoopBroadcast;

impl BroadcastHook for NoopBroadcast {
    fn emit(&self, _kind: BroadcastKind, _payload: serde_json::Value) {}
}

pub struct NoopNotifier;

#[async_trait]
impl NotificationHook for NoopNotifier {
    async fn alert_created(&self, _alert: &AlertRow) {}
    async fn alert_acknowledged(&self, _alert: &AlertRow, _operator: &str, _reason: Option<&str>) {}
    async fn alert_resolved(&self, _alert: &AlertRow) {}
}
