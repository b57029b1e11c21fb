use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskcast_api::config::ServerConfig;
use taskcast_api::router::build_app_router;
use taskcast_api::state::AppState;
use taskcast_events::{ConnectionRegistry, NotificationRelay, TaskEventBus};
use taskcast_worker::{cleanup, TaskQueue};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "taskcast_api=debug,taskcast_worker=debug,taskcast_events=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid configuration");
    tracing::info!(
        host = %config.host,
        port = config.port,
        pool_size = config.queue.pool_size,
        "Loaded server configuration"
    );

    // --- Event bus ---
    let event_bus = Arc::new(TaskEventBus::default());

    // --- Task queue ---
    let queue = TaskQueue::new(&config.queue, Arc::clone(&event_bus));
    let cleanup_handle = cleanup::spawn(queue.clone(), &config.queue);

    // --- Connections and notification relay ---
    let connections = Arc::new(ConnectionRegistry::new());
    let state = AppState::new(config.clone(), queue.clone(), Arc::clone(&connections));

    let relay_cancel = CancellationToken::new();
    let relay_handle = tokio::spawn(
        NotificationRelay::new(state.notifier.clone()).run(event_bus.subscribe(), relay_cancel.clone()),
    );
    tracing::info!("Background services started (cleanup, notification relay)");

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let drain = Duration::from_secs(config.shutdown_timeout_secs);

    cleanup_handle.shutdown().await;

    // Tasks still waiting for a slot are cancelled; running calls finish on their own.
    queue.shutdown();

    relay_cancel.cancel();
    let _ = tokio::time::timeout(drain, relay_handle).await;
    tracing::info!("Notification relay stopped");

    let remaining = connections.total_connections().await;
    tracing::info!(remaining, "Closing remaining WebSocket connections");
    connections.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
