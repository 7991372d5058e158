//! Palimpsest worker
//!
//! Drains the shared job queue: text extraction, LLM-driven LaTeX
//! transforms, and deterministic normalization. Run one or more of these
//! next to whatever serves the HTTP surface.

use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use palimpsest_engine::config::Config;
use palimpsest_engine::db;
use palimpsest_engine::jobs::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palimpsest_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Palimpsest worker v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Database: {}", config.database.url);
    tracing::info!("LaTeX engine: {}", config.latex.engine);

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("Database initialized");

    let concurrency = config.worker.concurrency.max(1);
    let worker = Worker::new(pool, config);

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let worker = worker.clone();
        tasks.push(tokio::spawn(async move { worker.run().await }));
    }
    tracing::info!("Worker pool started ({} workers)", concurrency);

    shutdown_signal().await;
    tracing::info!("Shutting down worker pool");
    for task in tasks {
        task.abort();
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
