use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cv_dashboard::config::Settings;
use cv_dashboard::router::build_router;
use cv_dashboard::services::conversation::ConversationCache;
use cv_dashboard::services::{
    BackendClient, ConversationManager, EventBus, HealthMonitor, JobWatchRegistry,
};
use cv_dashboard::state::AppState;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,cv_dashboard=debug".to_string()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("Starting CV dashboard gateway...");

    let settings = Arc::new(Settings::load()?);
    info!("Configuration loaded, backend at {}", settings.backend.base_url);

    let backend = Arc::new(BackendClient::new(&settings.backend)?);
    let shutdown = CancellationToken::new();
    let event_bus = Arc::new(EventBus::new(256));

    let conversation_manager = Arc::new(ConversationManager::new(
        ConversationCache::new(
            settings.conversation.session_ttl(),
            settings.conversation.memory_limit_percent,
        ),
        settings.conversation.pruning(),
        backend.clone(),
        backend.clone(),
    ));

    let health_monitor = Arc::new(HealthMonitor::new(
        backend.clone(),
        settings.health.backoff(),
        settings.health.refresh_interval(),
        shutdown.clone(),
    ));
    let monitor_task = health_monitor.spawn();

    let job_watches = Arc::new(JobWatchRegistry::new(
        backend.clone(),
        settings.job_watch.watch_config(),
        event_bus.clone(),
        shutdown.clone(),
    ));

    let cleanup_task = {
        let manager = conversation_manager.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        manager.cleanup_expired();
                    }
                }
            }
        })
    };

    let state = AppState {
        settings: settings.clone(),
        conversation_manager,
        health_monitor,
        job_watches,
        documents: backend,
        event_bus,
    };
    let app = build_router(state);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Stops the health poll and every job watcher.
    shutdown.cancel();
    monitor_task.await?;
    cleanup_task.await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
