//! Control-plane API — Axum server over the config and snapshot files.
//!
//! Runs as its own process. Reads are open; writes need the bearer token.
//! CORS is open to any origin for GET and POST so a locally served
//! dashboard can talk to it.

pub mod logs;
pub mod redact;
pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use secrecy::SecretString;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::storage::config_store::ConfigStore;
use crate::storage::snapshot::SnapshotReader;
use crate::strategy::registry::StrategyRegistry;
use routes::{ApiContext, ApiState, WriteAuth};

/// How often an open log stream checks the file for new lines.
const LOG_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Build the shared handler state from the process config.
pub fn context_from_config(cfg: &AppConfig, registry: StrategyRegistry) -> ApiState {
    let token = cfg.api.token_env.as_deref().and_then(|name| match AppConfig::resolve_env(name) {
        Ok(t) if !t.trim().is_empty() => Some(SecretString::new(t)),
        _ => {
            warn!(env = name, "API token variable not set");
            None
        }
    });
    let write_auth = WriteAuth::new(token, cfg.api.allow_unauthenticated_writes);
    match write_auth {
        WriteAuth::Token(_) => info!("Mutating endpoints require a bearer token"),
        WriteAuth::Open => warn!("Mutating endpoints are open: no token and unauthenticated writes allowed"),
        WriteAuth::Disabled => warn!("No API token configured, mutating endpoints are disabled"),
    }

    Arc::new(ApiContext {
        store: ConfigStore::new(&cfg.paths.runtime_config, registry),
        snapshots: SnapshotReader::new(&cfg.paths.snapshot, cfg.runner.stale_multiple),
        log_file: cfg.paths.log_file.clone(),
        log_poll: LOG_POLL_INTERVAL,
        write_auth,
    })
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/status", get(routes::get_status))
        .route("/api/config", get(routes::get_config).post(routes::post_config))
        .route("/api/strategy/activate", post(routes::activate_strategy))
        .route("/api/strategies", get(routes::get_strategies))
        .route("/api/logs/stream", get(logs::stream_logs))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve<F>(state: ApiState, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind control-plane API on {addr}"))?;
    info!(%addr, "Control-plane API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Control-plane API server error")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
