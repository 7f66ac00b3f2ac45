use std::sync::{Arc, RwLock};
use std::time::Instant;

use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use vigil_storage::{AcknowledgmentRow, AlertRow, AlertStore, ReconcileCounts};

use crate::connection::{ConnectionStatus, ConnectionTracker};
use crate::metrics::{PollMetrics, PollMetricsSnapshot};
use crate::{BroadcastHook, BroadcastKind, NotificationHook, SourceAdapter};

/// Result of one poll cycle. Every path returns a value; the cycle never
/// propagates an error to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Fetch succeeded and the batch was reconciled.
    Completed(ReconcileCounts),
    /// Fetch failed; the tracker was marked disconnected.
    SourceUnavailable,
    /// Disconnected and the backoff window has not elapsed; nothing was
    /// fetched.
    CoolingDown,
    /// A previous cycle is still in flight; this invocation did nothing.
    AlreadyRunning,
}

/// Drives ingestion cycles: fetch, connectivity bookkeeping, reconcile,
/// broadcast/notify fan-out, metrics. Also drives retention cleanup.
///
/// One instance owns all mutable poll state. The connection tracker is
/// single-writer (the cycle) with concurrent snapshot readers; the cycle
/// lock guards against overlapping invocations even though the scheduler
/// promises not to overlap them.
pub struct PollOrchestrator {
    store: Arc<AlertStore>,
    source: Arc<dyn SourceAdapter>,
    broadcaster: Arc<dyn BroadcastHook>,
    notifier: Arc<dyn NotificationHook>,
    connection: RwLock<ConnectionTracker>,
    metrics: std::sync::Mutex<PollMetrics>,
    cycle_lock: tokio::sync::Mutex<()>,
    retention_days: u32,
}

impl PollOrchestrator {
    pub fn new(
        store: Arc<AlertStore>,
        source: Arc<dyn SourceAdapter>,
        broadcaster: Arc<dyn BroadcastHook>,
        notifier: Arc<dyn NotificationHook>,
        initial_backoff_secs: u64,
        max_backoff_secs: u64,
        retention_days: u32,
    ) -> Self {
        Self {
            store,
            source,
            broadcaster,
            notifier,
            connection: RwLock::new(ConnectionTracker::new(
                initial_backoff_secs,
                max_backoff_secs,
            )),
            metrics: std::sync::Mutex::new(PollMetrics::default()),
            cycle_lock: tokio::sync::Mutex::new(()),
            retention_days,
        }
    }

    /// Run one ingestion cycle.
    pub async fn poll_cycle(&self) -> PollOutcome {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            tracing::warn!("Previous poll cycle still running, skipping");
            return PollOutcome::AlreadyRunning;
        };
        let started = Instant::now();

        // Backoff gate: while disconnected, only poll when an attempt is
        // due.
        {
            let mut conn = self.connection.write().unwrap();
            if !conn.is_connected() && !conn.attempt_reconnect() {
                return PollOutcome::CoolingDown;
            }
        }

        let batch = match self.source.fetch_events().await {
            Ok(batch) => batch,
            Err(e) => {
                let status = {
                    let mut conn = self.connection.write().unwrap();
                    conn.mark_disconnected(&e.to_string());
                    conn.status()
                };
                self.metrics
                    .lock()
                    .unwrap()
                    .record_failure(started.elapsed());
                self.broadcaster.emit(
                    BroadcastKind::ConnectionError,
                    json!({ "error": e.to_string() }),
                );
                self.broadcaster
                    .emit(BroadcastKind::ConnectionStatus, status_payload(&status));
                return PollOutcome::SourceUnavailable;
            }
        };

        let was_connected = self.connection.read().unwrap().is_connected();
        let status = {
            let mut conn = self.connection.write().unwrap();
            conn.mark_connected();
            conn.status()
        };
        if !was_connected {
            self.broadcaster
                .emit(BroadcastKind::ConnectionStatus, status_payload(&status));
        }

        let outcome = self.store.store_alerts(&batch).await;

        for alert in &outcome.created {
            self.broadcaster
                .emit(BroadcastKind::NewAlert, alert_payload(alert));
            self.notifier.alert_created(alert).await;
        }
        if !outcome.created.is_empty() {
            self.broadcaster.emit(
                BroadcastKind::NewAlertsBatch,
                json!({ "count": outcome.created.len() }),
            );
        }

        self.metrics
            .lock()
            .unwrap()
            .record_success(started.elapsed());
        tracing::debug!(
            created = outcome.counts.created,
            updated = outcome.counts.updated,
            skipped = outcome.counts.skipped,
            duplicates = outcome.counts.duplicates,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Poll cycle completed"
        );
        PollOutcome::Completed(outcome.counts)
    }

    /// Acknowledge an alert on behalf of an operator, then best-effort
    /// mirror the acknowledge to the source and fan out events.
    ///
    /// Safe to call while a poll cycle is in flight; the store serializes
    /// the row-level transaction, and a losing race surfaces as the typed
    /// `InvalidTransition`.
    pub async fn acknowledge_alert(
        &self,
        alert_id: &str,
        operator_name: &str,
        reason: Option<&str>,
    ) -> vigil_storage::Result<(AlertRow, AcknowledgmentRow)> {
        let (alert, mut ack) = self
            .store
            .acknowledge(alert_id, operator_name, reason)
            .await?;

        let message = reason.unwrap_or("Acknowledged via vigil");
        let synced = self
            .source
            .acknowledge_upstream(&alert.event_id, message, Some(operator_name))
            .await;
        if synced {
            // Keep the returned row consistent with what was persisted.
            match self.store.mark_ack_synced(&ack.id, true).await {
                Ok(()) => ack.synced_upstream = true,
                Err(e) => {
                    tracing::warn!(error = %e, ack_id = %ack.id, "Failed to record upstream sync flag");
                }
            }
        } else {
            tracing::warn!(
                event_id = %alert.event_id,
                "Upstream acknowledge failed, keeping local acknowledgment"
            );
        }

        self.broadcaster.emit(
            BroadcastKind::AlertAcknowledged,
            json!({
                "alert": alert_payload(&alert),
                "operator_name": operator_name,
                "reason": reason,
            }),
        );
        self.notifier
            .alert_acknowledged(&alert, operator_name, reason)
            .await;
        Ok((alert, ack))
    }

    /// Resolve an alert (system- or operator-triggered). No-op when
    /// already resolved.
    pub async fn resolve_alert(
        &self,
        alert_id: &str,
        actor: &str,
    ) -> vigil_storage::Result<Option<AlertRow>> {
        let resolved = self.store.resolve(alert_id, actor).await?;
        if let Some(alert) = &resolved {
            self.notifier.alert_resolved(alert).await;
        }
        Ok(resolved)
    }

    /// Run one retention cleanup cycle, returning the number of alerts
    /// removed. Persistence failures are logged, never raised.
    pub async fn cleanup_cycle(&self) -> u64 {
        match self.store.clear_old_alerts(self.retention_days).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    retention_days = self.retention_days,
                    "Retention cleanup failed"
                );
                0
            }
        }
    }

    /// Periodic poll loop. Stops when the shutdown channel flips.
    pub async fn run_poll_loop(&self, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs, "Poll loop started");
        let mut tick = interval(Duration::from_secs(interval_secs.max(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.poll_cycle().await;
                }
                _ = shutdown.changed() => {
                    tracing::info!("Poll loop stopping");
                    break;
                }
            }
        }
    }

    /// Periodic retention cleanup loop (daily by default).
    pub async fn run_cleanup_loop(&self, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs, "Cleanup loop started");
        let mut tick = interval(Duration::from_secs(interval_secs.max(60)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let removed = self.cleanup_cycle().await;
                    if removed > 0 {
                        tracing::info!(removed, "Cleanup cycle removed expired alerts");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Cleanup loop stopping");
                    break;
                }
            }
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.read().unwrap().status()
    }

    pub fn metrics_snapshot(&self) -> PollMetricsSnapshot {
        self.metrics.lock().unwrap().snapshot()
    }
}

fn status_payload(status: &ConnectionStatus) -> Value {
    serde_json::to_value(status).unwrap_or(Value::Null)
}

fn alert_payload(alert: &AlertRow) -> Value {
    serde_json::to_value(alert).unwrap_or(Value::Null)
}
