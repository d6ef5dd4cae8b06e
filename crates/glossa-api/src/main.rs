//! glossa API server and pipeline worker.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use glossa_api::{router, AppState};
use glossa_core::{defaults, Scorer, WorkItemRepository};
use glossa_db::{log_pool_metrics, Database};
use glossa_inference::{WhisperLanguageScorer, YtDlpExtractor};
use glossa_jobs::{recover_orphans, WorkerBuilder, WorkerConfig};

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "glossa_api=debug,glossa_jobs=info,tower_http=debug")
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "glossa_api=debug,glossa_jobs=info,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("glossa-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            // no ANSI in files unless asked for
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _file_guard = init_tracing();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = Database::connect(&database_url)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;
    log_pool_metrics(db.pool());
    info!("Database ready");

    let items: Arc<dyn WorkItemRepository> = Arc::new(db.items.clone());

    // Nothing may claim before in-flight leftovers are back in INIT.
    let recovered = recover_orphans(items.as_ref())
        .await
        .context("Recovery sweep failed")?;
    info!(recovered, "Startup recovery complete");

    let config = WorkerConfig::from_env();
    info!(
        worker_id = %config.worker_id,
        storage_root = %config.storage_root.display(),
        "Worker identity"
    );
    let scorer = WhisperLanguageScorer::from_env();
    match scorer.health_check().await {
        Ok(true) => info!("Scorer reachable"),
        Ok(false) | Err(_) => warn!(
            base_url = %scorer.base_url(),
            "Scorer health check failed, score cycles will fail until it recovers"
        ),
    }

    let worker = WorkerBuilder::new(items.clone())
        .with_config(config)
        .with_extractor(Arc::new(YtDlpExtractor::from_env()))
        .with_scorer(Arc::new(scorer))
        .build()
        .await
        .context("Failed to build pipeline worker")?;
    let worker_handle = worker.start();

    let host = std::env::var("HOST").unwrap_or_else(|_| defaults::SERVER_HOST.to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(defaults::SERVER_PORT);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    let app = router(AppState::new(items));
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker_handle.shutdown();
    worker_handle.join().await?;
    db.pool().close().await;
    info!("Shutdown complete");

    Ok(())
}
