//! Chorus Engine - Main Entry Point
//!
//! Composition root: builds the request queue, the client pool and their
//! background tasks with injected configuration, then waits for Ctrl+C.
//! The HTTP route layer attaches to these instances; they are passed by
//! reference, never reached through globals.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chorus_core::application::pool::{ClientPool, PoolConfig, PoolJanitor};
use chorus_core::application::queue::{QueueConfig, RequestQueue};
use chorus_core::application::shutdown::ShutdownController;
use chorus_core::port::id_provider::UuidProvider;
use chorus_core::port::time_provider::SystemTimeProvider;
use chorus_core::port::LocalClientFactory;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Stats heartbeat cadence (60s)
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (JSON in production, pretty for development)
    let log_format = std::env::var("CHORUS_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("chorus=info"))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Chorus Engine v{} starting...", VERSION);

    // 2. Load configuration
    let queue_config = QueueConfig {
        max_concurrent: env_or("CHORUS_MAX_CONCURRENT", QueueConfig::default().max_concurrent),
        max_batch_size: env_or("CHORUS_MAX_BATCH_SIZE", QueueConfig::default().max_batch_size),
        batch_idle_delay: Duration::from_millis(env_or(
            "CHORUS_BATCH_IDLE_MS",
            QueueConfig::default().batch_idle_delay.as_millis() as u64,
        )),
    };
    let pool_config = PoolConfig {
        max_size: env_or("CHORUS_POOL_MAX_SIZE", PoolConfig::default().max_size),
        idle_ttl: Duration::from_secs(env_or(
            "CHORUS_POOL_TTL_SECS",
            PoolConfig::default().idle_ttl.as_secs(),
        )),
        ..PoolConfig::default()
    };

    info!(
        max_concurrent = queue_config.max_concurrent,
        max_batch_size = queue_config.max_batch_size,
        pool_max_size = pool_config.max_size,
        "Configuration loaded"
    );

    // 3. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let client_factory = Arc::new(LocalClientFactory);

    // Queued actions deliver JSON documents from the file-backed store.
    let queue: RequestQueue<serde_json::Value> =
        RequestQueue::new(queue_config, id_provider, time_provider.clone());
    let pool = Arc::new(ClientPool::new(
        pool_config.clone(),
        client_factory,
        time_provider,
    ));

    // 4. Start background tasks
    let shutdown = ShutdownController::new();

    let janitor = PoolJanitor::new(pool.clone(), pool_config.cleanup_interval);
    let janitor_handle = tokio::spawn(janitor.run(shutdown.subscribe()));

    let heartbeat_queue = queue.clone();
    let heartbeat_pool = pool.clone();
    let mut heartbeat_shutdown = shutdown.subscribe();
    let heartbeat_handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let stats = heartbeat_queue.stats();
                    debug!(
                        queue_length = stats.queue_length,
                        in_flight = stats.in_flight,
                        pending_batches = stats.pending_batches,
                        pooled_clients = heartbeat_pool.len(),
                        "Engine heartbeat"
                    );
                }
                _ = heartbeat_shutdown.triggered() => break,
            }
        }
    });

    info!("Engine ready. Press Ctrl+C to shutdown");

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 6. Graceful shutdown
    shutdown.trigger();
    pool.clear();
    let _ = tokio::time::timeout(Duration::from_secs(5), janitor_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_handle).await;

    info!("Shutdown complete.");

    Ok(())
}
