use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use vigil_ingest::{BroadcastHook, NotificationHook, PollOrchestrator, SourceAdapter};
use vigil_notify::channels::telegram::TelegramChannel;
use vigil_notify::manager::{MessageFormat, NotificationManager};
use vigil_notify::NotificationChannel;
use vigil_storage::AlertStore;

use vigil_server::app;
use vigil_server::broadcast::EventBus;
use vigil_server::config::ServerConfig;
use vigil_server::source::{DisabledSource, JsonRpcSource};
use vigil_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("config/server.toml");
    let config = ServerConfig::load(config_path)?;

    vigil_common::id::init(config.node_id);

    tracing::info!(
        http_port = config.http_port,
        db = %config.database.redacted_url(),
        source_enabled = config.source.enabled(),
        "vigil-server starting"
    );

    let store = Arc::new(AlertStore::new(&config.database.url).await?);
    let bus = Arc::new(EventBus::default());

    let source: Arc<dyn SourceAdapter> = if config.source.enabled() {
        Arc::new(JsonRpcSource::new(&config.source)?)
    } else {
        tracing::warn!("No monitoring source configured, poll loop disabled");
        Arc::new(DisabledSource)
    };

    let notifier: Arc<dyn NotificationHook> = build_notifier(&config);

    let orchestrator = Arc::new(PollOrchestrator::new(
        store.clone(),
        source,
        bus.clone() as Arc<dyn BroadcastHook>,
        notifier,
        config.poll.initial_backoff_secs,
        config.poll.max_backoff_secs,
        config.cleanup.retention_days,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poll_handle = if config.source.enabled() {
        let orchestrator = orchestrator.clone();
        let interval_secs = config.poll.interval_secs;
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            orchestrator.run_poll_loop(interval_secs, shutdown).await;
        }))
    } else {
        None
    };

    let cleanup_handle = {
        let orchestrator = orchestrator.clone();
        let interval_secs = config.cleanup.interval_secs;
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            orchestrator.run_cleanup_loop(interval_secs, shutdown).await;
        })
    };

    let state = AppState {
        store,
        orchestrator,
        bus,
        start_time: Utc::now(),
        poller_enabled: config.source.enabled(),
        config: Arc::new(config.clone()),
    };

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = app::build_http_app(state);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(http = %http_addr, "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await?;

    // Stop the periodic loops and wait for them to drain.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = poll_handle {
        let _ = handle.await;
    }
    let _ = cleanup_handle.await;
    tracing::info!("Server stopped");

    Ok(())
}

fn build_notifier(config: &ServerConfig) -> Arc<dyn NotificationHook> {
    let notifications = &config.notifications;
    let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();
    if notifications.telegram_enabled {
        if notifications.telegram_token.is_empty() || notifications.telegram_chat_ids.is_empty() {
            tracing::warn!("Telegram enabled but token or chat ids missing, channel not started");
        } else {
            channels.push(Box::new(TelegramChannel::new(
                &notifications.telegram_token,
                &notifications.telegram_chat_ids,
                None,
            )));
        }
    }

    let format = MessageFormat::from_str(&notifications.message_format).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Falling back to short message format");
        MessageFormat::Short
    });
    Arc::new(NotificationManager::new(
        channels,
        format,
        notifications.dashboard_url.clone(),
    ))
}
