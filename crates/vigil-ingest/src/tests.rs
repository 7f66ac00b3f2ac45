use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;

use vigil_common::types::EventRecord;
use vigil_storage::{AlertRow, AlertStore};

use crate::connection::ConnectionTracker;
use crate::metrics::PollMetrics;
use crate::poller::{PollOrchestrator, PollOutcome};
use crate::{BroadcastHook, BroadcastKind, NotificationHook, SourceAdapter};

fn make_event(event_id: &str, severity: i32) -> EventRecord {
    EventRecord {
        event_id: event_id.to_string(),
        problem_id: None,
        host: "web-01".to_string(),
        name: "cpu high".to_string(),
        severity,
        clock: Utc::now().timestamp(),
        raw: serde_json::json!({ "eventid": event_id }),
    }
}

// ---- Connection tracker ----

#[test]
fn first_reconnect_attempt_is_immediate() {
    let mut tracker = ConnectionTracker::new(1, 300);
    tracker.mark_disconnected("boom");
    assert!(tracker.attempt_reconnect());
}

#[test]
fn backoff_doubles_until_capped() {
    let mut tracker = ConnectionTracker::new(1, 300);
    tracker.mark_disconnected("boom");

    let mut now = Utc::now();
    assert!(tracker.attempt_reconnect_at(now)); // schedules immediately

    // Successive due attempts wait 1, 2, 4, ... 256, 300, 300 seconds.
    let mut waits = Vec::new();
    for _ in 0..11 {
        let wait = tracker.current_backoff_secs();
        assert!(tracker.attempt_reconnect_at(now));
        waits.push(wait);
        now += Duration::seconds(wait as i64);
    }
    assert_eq!(waits, vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 300, 300]);
}

#[test]
fn attempt_before_schedule_elapses_is_denied() {
    let mut tracker = ConnectionTracker::new(60, 300);
    tracker.mark_disconnected("boom");

    let now = Utc::now();
    assert!(tracker.attempt_reconnect_at(now));
    assert!(tracker.attempt_reconnect_at(now)); // due: schedules now+60
    assert!(!tracker.attempt_reconnect_at(now + Duration::seconds(10)));
    assert!(tracker.attempt_reconnect_at(now + Duration::seconds(61)));
}

#[test]
fn mark_connected_resets_backoff_and_failures() {
    let mut tracker = ConnectionTracker::new(1, 300);
    let now = Utc::now();
    for _ in 0..4 {
        tracker.mark_disconnected_at("boom", now);
    }
    tracker.attempt_reconnect_at(now);
    tracker.attempt_reconnect_at(now);
    assert!(tracker.current_backoff_secs() > 1);

    tracker.mark_connected_at(now);
    let status = tracker.status();
    assert!(status.connected);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(status.error_count, 0);
    assert_eq!(status.current_backoff_secs, 1);
    assert!(status.next_reconnect_at.is_none());
    assert_eq!(status.last_successful_poll, Some(now));
}

#[test]
fn three_failures_walk_the_backoff_sequence() {
    // Initial 1s, capped at 60s: after three failures the computed
    // backoff has walked 1 -> 2 -> 4.
    let mut tracker = ConnectionTracker::new(1, 60);
    let t0 = Utc::now();

    tracker.mark_disconnected_at("e1", t0);
    assert!(tracker.attempt_reconnect_at(t0)); // immediate
    tracker.mark_disconnected_at("e2", t0);
    assert!(tracker.attempt_reconnect_at(t0)); // waits 1s, backoff -> 2
    tracker.mark_disconnected_at("e3", t0 + Duration::seconds(1));
    assert!(tracker.attempt_reconnect_at(t0 + Duration::seconds(1))); // waits 2s, backoff -> 4

    assert_eq!(tracker.consecutive_failures(), 3);
    assert_eq!(tracker.current_backoff_secs(), 4);
}

// ---- Metrics ----

#[test]
fn metrics_success_ratio() {
    let mut metrics = PollMetrics::default();
    assert_eq!(metrics.snapshot().success_ratio, 0.0);

    metrics.record_success(StdDuration::from_millis(12));
    metrics.record_success(StdDuration::from_millis(8));
    metrics.record_failure(StdDuration::from_millis(30));

    let snap = metrics.snapshot();
    assert_eq!(snap.total_cycles, 3);
    assert_eq!(snap.success_cycles, 2);
    assert_eq!(snap.failure_cycles, 1);
    assert_eq!(snap.last_duration_ms, 30);
    assert!((snap.success_ratio - 2.0 / 3.0).abs() < 1e-9);
}

// ---- Orchestrator ----

struct MockSource {
    responses: Mutex<VecDeque<Result<Vec<EventRecord>>>>,
    ack_ok: bool,
    acks: Mutex<Vec<String>>,
}

impl MockSource {
    fn new(responses: Vec<Result<Vec<EventRecord>>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ack_ok: true,
            acks: Mutex::new(Vec::new()),
        }
    }

    fn failing_acks(mut self) -> Self {
        self.ack_ok = false;
        self
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    async fn fetch_events(&self) -> Result<Vec<EventRecord>> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn acknowledge_upstream(
        &self,
        external_id: &str,
        _message: &str,
        _actor: Option<&str>,
    ) -> bool {
        self.acks.lock().unwrap().push(external_id.to_string());
        self.ack_ok
    }
}

#[derive(Default)]
struct RecordingBroadcast {
    events: Mutex<Vec<(BroadcastKind, Value)>>,
}

impl RecordingBroadcast {
    fn kinds(&self) -> Vec<BroadcastKind> {
        self.events.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }
}

impl BroadcastHook for RecordingBroadcast {
    fn emit(&self, kind: BroadcastKind, payload: Value) {
        self.events.lock().unwrap().push((kind, payload));
    }
}

#[derive(Default)]
struct RecordingNotifier {
    created: Mutex<Vec<String>>,
    acked: Mutex<Vec<(String, String)>>,
    resolved: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationHook for RecordingNotifier {
    async fn alert_created(&self, alert: &AlertRow) {
        self.created.lock().unwrap().push(alert.event_id.clone());
    }

    async fn alert_acknowledged(&self, alert: &AlertRow, operator: &str, _reason: Option<&str>) {
        self.acked
            .lock()
            .unwrap()
            .push((alert.event_id.clone(), operator.to_string()));
    }

    async fn alert_resolved(&self, alert: &AlertRow) {
        self.resolved.lock().unwrap().push(alert.event_id.clone());
    }
}

async fn build_orchestrator(
    source: MockSource,
    initial_backoff_secs: u64,
) -> (
    Arc<PollOrchestrator>,
    Arc<AlertStore>,
    Arc<RecordingBroadcast>,
    Arc<RecordingNotifier>,
    Arc<MockSource>,
) {
    vigil_common::id::init(1);
    let store = Arc::new(AlertStore::new("sqlite::memory:").await.unwrap());
    let source = Arc::new(source);
    let broadcast = Arc::new(RecordingBroadcast::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = Arc::new(PollOrchestrator::new(
        store.clone(),
        source.clone(),
        broadcast.clone(),
        notifier.clone(),
        initial_backoff_secs,
        300,
        30,
    ));
    (orchestrator, store, broadcast, notifier, source)
}

#[tokio::test]
async fn successful_cycle_reconciles_and_fans_out() {
    let source = MockSource::new(vec![Ok(vec![make_event("e1", 4), make_event("e2", 2)])]);
    let (orchestrator, store, broadcast, notifier, _) = build_orchestrator(source, 1).await;

    let outcome = orchestrator.poll_cycle().await;
    let PollOutcome::Completed(counts) = outcome else {
        panic!("expected completed cycle, got {outcome:?}");
    };
    assert_eq!(counts.created, 2);

    assert!(store.get_alert_by_event_id("e1").await.unwrap().is_some());

    let kinds = broadcast.kinds();
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == BroadcastKind::NewAlert)
            .count(),
        2
    );
    assert!(kinds.contains(&BroadcastKind::NewAlertsBatch));
    assert!(kinds.contains(&BroadcastKind::ConnectionStatus));

    assert_eq!(notifier.created.lock().unwrap().len(), 2);

    let status = orchestrator.connection_status();
    assert!(status.connected);
    let metrics = orchestrator.metrics_snapshot();
    assert_eq!(metrics.success_cycles, 1);
    assert_eq!(metrics.failure_cycles, 0);
}

#[tokio::test]
async fn failed_fetch_marks_disconnected_without_raising() {
    let source = MockSource::new(vec![Err(anyhow!("connection refused"))]);
    let (orchestrator, _, broadcast, _, _) = build_orchestrator(source, 1).await;

    let outcome = orchestrator.poll_cycle().await;
    assert_eq!(outcome, PollOutcome::SourceUnavailable);

    let status = orchestrator.connection_status();
    assert!(!status.connected);
    assert_eq!(status.consecutive_failures, 1);
    assert_eq!(status.last_error.as_deref(), Some("connection refused"));

    let kinds = broadcast.kinds();
    assert!(kinds.contains(&BroadcastKind::ConnectionError));
    assert!(kinds.contains(&BroadcastKind::ConnectionStatus));
    assert!(!kinds.contains(&BroadcastKind::NewAlert));

    assert_eq!(orchestrator.metrics_snapshot().failure_cycles, 1);
}

#[tokio::test]
async fn cycles_cool_down_between_reconnect_attempts() {
    let source = MockSource::new(vec![
        Err(anyhow!("down")),
        Err(anyhow!("still down")),
        Err(anyhow!("unreachable")),
    ]);
    // Large initial backoff so the third cycle lands inside the window.
    let (orchestrator, _, _, _, _) = build_orchestrator(source, 3600).await;

    assert_eq!(
        orchestrator.poll_cycle().await,
        PollOutcome::SourceUnavailable
    );
    assert_eq!(
        orchestrator.poll_cycle().await,
        PollOutcome::SourceUnavailable
    );
    assert_eq!(orchestrator.poll_cycle().await, PollOutcome::CoolingDown);
    // Only the two real attempts touched the metrics.
    assert_eq!(orchestrator.metrics_snapshot().total_cycles, 2);
}

#[tokio::test]
async fn repeated_batch_creates_nothing_new() {
    let batch = vec![make_event("e1", 3)];
    let source = MockSource::new(vec![Ok(batch.clone()), Ok(batch)]);
    let (orchestrator, _, broadcast, _, _) = build_orchestrator(source, 1).await;

    orchestrator.poll_cycle().await;
    let before = broadcast
        .kinds()
        .iter()
        .filter(|k| **k == BroadcastKind::NewAlert)
        .count();

    let outcome = orchestrator.poll_cycle().await;
    let PollOutcome::Completed(counts) = outcome else {
        panic!("expected completed cycle");
    };
    assert_eq!(counts.created, 0);
    assert_eq!(counts.updated, 1);

    let after = broadcast
        .kinds()
        .iter()
        .filter(|k| **k == BroadcastKind::NewAlert)
        .count();
    assert_eq!(before, after, "re-delivery must not re-broadcast");
}

#[tokio::test]
async fn acknowledge_syncs_upstream_and_notifies() {
    let source = MockSource::new(vec![Ok(vec![make_event("e1", 4)])]);
    let (orchestrator, store, broadcast, notifier, source) = build_orchestrator(source, 1).await;
    orchestrator.poll_cycle().await;
    let alert = store.get_alert_by_event_id("e1").await.unwrap().unwrap();

    let (updated, ack) = orchestrator
        .acknowledge_alert(&alert.id, "alice", Some("known issue"))
        .await
        .unwrap();
    assert_eq!(updated.status, vigil_common::types::AlertStatus::Acknowledged);
    // The returned row must already carry the sync result, not just the DB.
    assert!(ack.synced_upstream);

    assert_eq!(source.acks.lock().unwrap().as_slice(), ["e1"]);
    let acks = store.list_acknowledgments(&alert.id).await.unwrap();
    assert_eq!(acks[0].id, ack.id);
    assert!(acks[0].synced_upstream);

    assert!(broadcast.kinds().contains(&BroadcastKind::AlertAcknowledged));
    assert_eq!(
        notifier.acked.lock().unwrap().as_slice(),
        [("e1".to_string(), "alice".to_string())]
    );
}

#[tokio::test]
async fn upstream_ack_failure_keeps_local_acknowledgment() {
    let source = MockSource::new(vec![Ok(vec![make_event("e1", 4)])]).failing_acks();
    let (orchestrator, store, _, _, _) = build_orchestrator(source, 1).await;
    orchestrator.poll_cycle().await;
    let alert = store.get_alert_by_event_id("e1").await.unwrap().unwrap();

    let (_, ack) = orchestrator
        .acknowledge_alert(&alert.id, "alice", None)
        .await
        .unwrap();
    assert!(!ack.synced_upstream);

    let acks = store.list_acknowledgments(&alert.id).await.unwrap();
    assert_eq!(acks.len(), 1);
    assert!(!acks[0].synced_upstream);
    assert_eq!(
        store.get_alert(&alert.id).await.unwrap().unwrap().status,
        vigil_common::types::AlertStatus::Acknowledged
    );
}

/// Source that parks inside `fetch_events` until released, so a cycle can
/// be held in flight deliberately.
struct BlockingSource {
    entered: Arc<tokio::sync::Notify>,
    release: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl SourceAdapter for BlockingSource {
    async fn fetch_events(&self) -> Result<Vec<EventRecord>> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Vec::new())
    }

    async fn acknowledge_upstream(
        &self,
        _external_id: &str,
        _message: &str,
        _actor: Option<&str>,
    ) -> bool {
        true
    }
}

#[tokio::test]
async fn overlapping_cycles_skip_instead_of_stacking() {
    vigil_common::id::init(1);
    let entered = Arc::new(tokio::sync::Notify::new());
    let release = Arc::new(tokio::sync::Notify::new());
    let store = Arc::new(AlertStore::new("sqlite::memory:").await.unwrap());
    let orchestrator = Arc::new(PollOrchestrator::new(
        store,
        Arc::new(BlockingSource {
            entered: entered.clone(),
            release: release.clone(),
        }),
        Arc::new(RecordingBroadcast::default()),
        Arc::new(RecordingNotifier::default()),
        1,
        300,
        30,
    ));

    let in_flight = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.poll_cycle().await }
    });
    // Wait until the first cycle holds the lock inside the fetch.
    entered.notified().await;

    assert_eq!(orchestrator.poll_cycle().await, PollOutcome::AlreadyRunning);

    release.notify_one();
    let first = in_flight.await.unwrap();
    assert!(matches!(first, PollOutcome::Completed(_)));
    // Only the in-flight cycle touched the metrics.
    assert_eq!(orchestrator.metrics_snapshot().total_cycles, 1);
}

#[tokio::test]
async fn resolve_notifies_once() {
    let source = MockSource::new(vec![Ok(vec![make_event("e1", 4)])]);
    let (orchestrator, store, _, notifier, _) = build_orchestrator(source, 1).await;
    orchestrator.poll_cycle().await;
    let alert = store.get_alert_by_event_id("e1").await.unwrap().unwrap();

    assert!(orchestrator
        .resolve_alert(&alert.id, "system")
        .await
        .unwrap()
        .is_some());
    assert!(orchestrator
        .resolve_alert(&alert.id, "system")
        .await
        .unwrap()
        .is_none());
    assert_eq!(notifier.resolved.lock().unwrap().as_slice(), ["e1"]);
}
