//! API server entry point.

use std::sync::Arc;

use api::{AppState, Config};
use auth::{KeyLookup, KeyStore};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{Database, InMemoryDatabase, PostgresDatabase};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<D: Database>(
    db: D,
    keys: Arc<dyn KeyLookup>,
    config: &Config,
    metrics_handle: PrometheusHandle,
) {
    let state = Arc::new(AppState::new(db, keys, config));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let keys = KeyStore::load_from_dir(&config.keys_dir).expect("failed to load auth keys");
    let keys: Arc<dyn KeyLookup> = Arc::new(keys);

    tracing::info!(
        restock_on_cancel = config.order_policy.restock_on_cancel,
        delete_policy = config.order_policy.delete.as_str(),
        deadline_ms = u64::try_from(config.request_deadline.as_millis()).unwrap_or(u64::MAX),
        "order policy"
    );

    match config.database_url.as_deref() {
        Some(url) => {
            let db = PostgresDatabase::connect(url, config.database_max_connections)
                .await
                .expect("failed to connect to database");
            db.run_migrations()
                .await
                .expect("failed to run migrations");
            serve(db.clone(), keys, &config, metrics_handle).await;
            db.pool().close().await;
            tracing::info!("database pool closed");
        }
        None => {
            tracing::warn!("DATABASE_URL not set, serving from an empty in-memory store");
            serve(InMemoryDatabase::new(), keys, &config, metrics_handle).await;
        }
    }
}
