//! Vault Cache - HTTP host for the cache engine
//!
//! Serves one namespace of the encrypted, TTL-aware cache over REST.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vault_cache::api::create_router;
use vault_cache::{spawn_sweep_task, AppState, CacheConfig, CacheFlags, ServerConfig};

/// Main entry point for the Vault Cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the configured backend and build the engine
/// 4. Start the background sweep task when auto-cleanup is on
/// 5. Serve the router until SIGINT/SIGTERM, then tear the engine down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vault_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Vault Cache Server");

    let config = CacheConfig::from_env();
    let flags = CacheFlags::from_env();
    let server = ServerConfig::from_env();
    info!(
        "Configuration loaded: prefix={}, storage={}, default_ttl={}m, port={}, sweep_interval={}s",
        config.prefix,
        config.storage_type.name(),
        config.default_ttl,
        server.server_port,
        config.sweep_interval_secs
    );

    let sweep_interval = Duration::from_secs(config.sweep_interval_secs.max(1));
    let state = AppState::from_config(config, flags)?;
    {
        let cache = state.cache.read().await;
        if !cache.is_storage_supported() {
            warn!("Storage backend unavailable; serving in degraded mode");
        }
    }
    info!("Cache engine initialized");

    let sweep_handle = flags.auto_cleanup.then(|| {
        info!("Background sweep task started");
        spawn_sweep_task(state.cache.clone(), sweep_interval)
    });

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], server.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sweep_handle))
        .await?;

    state.cache.write().await.destroy();
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the sweep task and allows graceful shutdown.
async fn shutdown_signal(sweep_handle: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Some(handle) = sweep_handle {
        handle.abort();
        warn!("Sweep task aborted");
    }
}
