//! dcatd - HTTP server for the dcatd metadata catalog

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dcatd_api::{router, AppConfig, AppState, StorageBackendKind};
use dcatd_core::{logging, DcatApProfile, HookName, HookRegistry};
use dcatd_db::{Database, MemoryDatasetStore, PoolConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "dcatd_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dcatd_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("dcatd.log");
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
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
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

    let config = AppConfig::from_env()?;
    info!(
        subsystem = logging::SUBSYSTEM_API,
        base_url = %config.base_url,
        storage_backend = ?config.storage_backend,
        storage_mode = ?config.storage_mode,
        rate_limit_enabled = config.rate_limit.is_some(),
        "Configuration loaded"
    );

    let hooks = Arc::new(build_registry(&config).await?);
    hooks.initialize().await?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = AppState::new(hooks.clone(), config)?;
    let app = router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, releasing plugins");
    hooks.deinitialize().await?;
    Ok(())
}

/// Register the profile and the configured storage/search backend.
async fn build_registry(config: &AppConfig) -> anyhow::Result<HookRegistry> {
    let builder = HookRegistry::builder()
        .profile(Arc::new(DcatApProfile::new()))
        .call_timeout(config.backend_timeout);

    let builder = match config.storage_backend {
        StorageBackendKind::Postgres => {
            let pool_config = PoolConfig::new()
                .max_connections(config.db_max_connections)
                .connect_retry(config.db_connect_max_tries, config.db_connect_retry_interval);
            let db = Database::connect_with_config(&config.database_url, pool_config).await?;
            if config.is_read_only() {
                info!(
                    subsystem = logging::SUBSYSTEM_DATABASE,
                    "Read-only storage mode, skipping migrations"
                );
            } else {
                db.migrate().await?;
                info!(subsystem = logging::SUBSYSTEM_DATABASE, "Migrations applied");
            }
            builder.storage(db.datasets.clone()).search(db.datasets)
        }
        StorageBackendKind::Memory => {
            let store = Arc::new(MemoryDatasetStore::new());
            builder.storage(store.clone()).search(store)
        }
    };

    let hooks = builder.build()?;
    info!(
        subsystem = logging::SUBSYSTEM_API,
        profile = hooks.mds_name().unwrap_or("(none)"),
        storage = ?hooks.implementations(HookName::StorageRetrieve),
        "Hook registry built"
    );
    Ok(hooks)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
