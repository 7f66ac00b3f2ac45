use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use vigil_ingest::{BroadcastHook, BroadcastKind};

/// One realtime event on the bus.
#[derive(Debug, Clone, Serialize)]
pub struct BusEvent {
    pub kind: &'static str,
    pub payload: Value,
}

/// In-process realtime event hub.
///
/// Backed by `tokio::sync::broadcast`: zero or more subscribers, slow
/// subscribers lag and drop, publishing never blocks. The orchestrator
/// publishes through the [`BroadcastHook`] seam and stays unaware of who
/// is listening.
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl BroadcastHook for EventBus {
    fn emit(&self, kind: BroadcastKind, payload: Value) {
        // send only fails when nobody is subscribed, which is fine.
        let _ = self.tx.send(BusEvent {
            kind: kind.as_str(),
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(BroadcastKind::NewAlert, json!({ "id": "1" }));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "new_alert");
        assert_eq!(event.payload["id"], "1");
    }

    #[test]
    fn emit_without_subscribers_is_a_noop() {
        let bus = EventBus::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(BroadcastKind::ConnectionError, json!({ "error": "down" }));
    }
}
