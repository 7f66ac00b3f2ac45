use std::sync::Arc;

use chrono::{DateTime, Utc};
use vigil_ingest::PollOrchestrator;
use vigil_storage::AlertStore;

use crate::broadcast::EventBus;
use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AlertStore>,
    pub orchestrator: Arc<PollOrchestrator>,
    pub bus: Arc<EventBus>,
    pub start_time: DateTime<Utc>,
    /// Whether the periodic poll loop was started (a source is configured).
    pub poller_enabled: bool,
    pub config: Arc<ServerConfig>,
}
