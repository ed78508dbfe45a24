//! Control-plane route handlers.
//!
//! Reads come from the config file, the strategy registry and the status
//! snapshot. Writes go through the config store only. The API never talks
//! to the scanner; it learns what the scanner did from the next snapshot.
//!
//! Every JSON body is passed through the redaction filter on the way out.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

use super::redact::redact_json;
use crate::engine::gate::ExecutionDecision;
use crate::storage::config_store::{mtime_utc, ConfigStore, SaveOutcome};
use crate::storage::runtime_config::{RuntimeConfig, RuntimeConfigPatch};
use crate::storage::snapshot::{SnapshotReader, SnapshotView};
use crate::strategy::registry::StrategyDescriptor;
use crate::types::{ConfigError, FieldError};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Who may call the mutating endpoints.
pub enum WriteAuth {
    /// Bearer token must match.
    Token(SecretString),
    /// No token configured and unauthenticated writes explicitly allowed.
    Open,
    /// No token configured; writes refused.
    Disabled,
}

impl WriteAuth {
    pub fn new(token: Option<SecretString>, allow_unauthenticated_writes: bool) -> Self {
        match token {
            Some(t) => WriteAuth::Token(t),
            None if allow_unauthenticated_writes => WriteAuth::Open,
            None => WriteAuth::Disabled,
        }
    }

    fn check(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let expected = match self {
            WriteAuth::Open => return Ok(()),
            WriteAuth::Disabled => return Err(ApiError::WritesDisabled),
            WriteAuth::Token(t) => t,
        };
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(ApiError::Unauthorized)?;

        if constant_time_eq(presented.as_bytes(), expected.expose_secret().as_bytes()) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

/// Compare without an early exit, so timing says nothing about how much
/// of the token matched.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= (x ^ y) as usize;
    }
    diff == 0
}

/// Everything the handlers need, built once at startup.
pub struct ApiContext {
    pub store: ConfigStore,
    pub snapshots: SnapshotReader,
    pub log_file: PathBuf,
    pub log_poll: Duration,
    pub write_auth: WriteAuth,
}

pub type ApiState = Arc<ApiContext>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<FieldError>),
    BadRequest(String),
    Unauthorized,
    WritesDisabled,
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Validation(errors) => ApiError::Validation(errors),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "validation failed".to_string(),
                serde_json::to_value(errors).ok(),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid request body".to_string(),
                Some(serde_json::Value::String(msg)),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "missing or invalid bearer token".to_string(),
                None,
            ),
            ApiError::WritesDisabled => (
                StatusCode::FORBIDDEN,
                "writes are disabled: no API token configured".to_string(),
                None,
            ),
            ApiError::Internal(msg) => {
                warn!(error = %msg, "API request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
        };
        match redacted(&ErrorBody { error, details }) {
            Ok(body) => (status, body).into_response(),
            Err(_) => status.into_response(),
        }
    }
}

/// Serialise, scrub, wrap.
fn redacted<T: Serialize>(value: &T) -> Result<Json<serde_json::Value>, ApiError> {
    let mut json = serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))?;
    redact_json(&mut json);
    Ok(Json(json))
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub view: SnapshotView,
    /// Mtime of the config file on disk right now.
    pub config_mtime: Option<DateTime<Utc>>,
    /// True when the scanner's last cycle ran on a different config than
    /// the one on disk, i.e. a write has not been picked up yet.
    pub config_drift: bool,
    /// Gate outcome as the operator should see it.
    pub execution_label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfigWriteResponse {
    pub config: RuntimeConfig,
    pub changed: bool,
    pub config_mtime: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StrategiesResponse<'a> {
    pub default_key: &'static str,
    pub strategies: &'a [StrategyDescriptor],
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateRequest {
    pub key: String,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Run file I/O on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
}

/// GET /api/status
pub async fn get_status(State(state): State<ApiState>) -> Result<Json<serde_json::Value>, ApiError> {
    blocking(move || read_status(&state)).await
}

fn read_status(state: &ApiContext) -> Result<Json<serde_json::Value>, ApiError> {
    let (scan_interval, config_mtime) = match state.store.load() {
        Ok((cfg, mtime)) => (cfg.scan_interval_seconds, Some(mtime_utc(mtime))),
        Err(e) => {
            warn!(error = %e, "Runtime config unreadable while serving status");
            let template = RuntimeConfig::template(state.store.registry());
            let on_disk = state.store.get_mtime().ok().flatten().map(mtime_utc);
            (template.scan_interval_seconds, on_disk)
        }
    };

    let view = state
        .snapshots
        .view(scan_interval, SystemTime::now())
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let config_drift = match &view.snapshot {
        Some(snap) => snap.config_mtime != config_mtime,
        None => false,
    };
    let execution_label = view.snapshot.as_ref().map(|snap| {
        ExecutionDecision {
            allow: snap.execution_enabled,
            reason: snap.execution_reason,
        }
        .label()
    });

    redacted(&StatusResponse {
        view,
        config_mtime,
        config_drift,
        execution_label,
    })
}

/// GET /api/config
pub async fn get_config(State(state): State<ApiState>) -> Result<Json<serde_json::Value>, ApiError> {
    blocking(move || {
        let (config, _) = state.store.load()?;
        redacted(&config)
    })
    .await
}

/// POST /api/config
pub async fn post_config(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<RuntimeConfigPatch>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.write_auth.check(&headers)?;
    let Json(patch) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    blocking(move || write_patch(&state, &patch)).await
}

/// POST /api/strategy/activate
pub async fn activate_strategy(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<ActivateRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.write_auth.check(&headers)?;
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    blocking(move || write_patch(&state, &RuntimeConfigPatch::strategy(&request.key))).await
}

fn write_patch(state: &ApiContext, patch: &RuntimeConfigPatch) -> Result<Json<serde_json::Value>, ApiError> {
    let (config, outcome) = state.store.apply_patch(patch)?;
    let changed = matches!(outcome, SaveOutcome::Written { .. });
    info!(
        strategy = %config.active_strategy_key,
        scan_interval_seconds = config.scan_interval_seconds,
        changed,
        "Runtime config updated via API"
    );
    redacted(&ConfigWriteResponse {
        config,
        changed,
        config_mtime: mtime_utc(outcome.mtime()),
    })
}

/// GET /api/strategies
pub async fn get_strategies(State(state): State<ApiState>) -> Result<Json<serde_json::Value>, ApiError> {
    let registry = state.store.registry();
    redacted(&StrategiesResponse {
        default_key: registry.default_key(),
        strategies: registry.list(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
