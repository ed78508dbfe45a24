//! Shared setup: one temp directory holding the runtime config, the
//! status snapshot and the scanner log, with helpers to build the API
//! router and a scanner runner over it.

use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use secrecy::SecretString;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use fxgate::config::ExecutionEnv;
use fxgate::dashboard::build_router;
use fxgate::dashboard::routes::{ApiContext, ApiState, WriteAuth};
use fxgate::engine::accounts::Account;
use fxgate::engine::gate::ExecutionGate;
use fxgate::engine::runner::ScannerRunner;
use fxgate::storage::config_store::ConfigStore;
use fxgate::storage::runtime_config::{ExecutionPolicyPatch, RuntimeConfigPatch};
use fxgate::storage::snapshot::{SnapshotReader, SnapshotWriter, StatusSnapshot};
use fxgate::strategy::registry::StrategyRegistry;

pub const TOKEN: &str = "integration-token";

pub struct Harness {
    pub dir: tempfile::TempDir,
    state: ApiState,
}

impl Harness {
    /// Fresh directory with the template config, weekend skipping off so
    /// results do not depend on the day the suite runs. Every router and
    /// store handed out shares one API context, as in a real process.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("runtime_config.json"), StrategyRegistry::builtin());
        let state = Arc::new(ApiContext {
            store: store.clone(),
            snapshots: SnapshotReader::new(dir.path().join("status.json"), 3),
            log_file: dir.path().join("scanner.log"),
            log_poll: Duration::from_millis(10),
            write_auth: WriteAuth::new(Some(SecretString::new(TOKEN.to_string())), false),
        });
        store.ensure_exists().unwrap();
        store
            .apply_patch(&RuntimeConfigPatch {
                execution_policy: Some(ExecutionPolicyPatch {
                    skip_weekends: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .unwrap();
        Self { dir, state }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.path().join("status.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join("scanner.log")
    }

    pub fn store(&self) -> ConfigStore {
        self.state.store.clone()
    }

    pub fn api(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn runner(&self, env: ExecutionEnv, accounts: Vec<Account>) -> ScannerRunner {
        ScannerRunner::new(
            self.store(),
            ExecutionGate::new(env, Uuid::new_v4()),
            accounts,
            SnapshotWriter::new(self.snapshot_path()),
        )
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let raw = std::fs::read_to_string(self.snapshot_path()).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    pub async fn get(&self, uri: &str) -> (u16, Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(self.api(), req).await
    }

    pub async fn post(&self, uri: &str, body: &str) -> (u16, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .body(Body::from(body.to_string()))
            .unwrap();
        send(self.api(), req).await
    }
}

async fn send(app: Router, req: Request<Body>) -> (u16, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status().as_u16();
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

/// Execution flags from literal pairs, without touching the process
/// environment.
pub fn env(pairs: &[(&str, &str)]) -> ExecutionEnv {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ExecutionEnv::from_lookup(|name| vars.get(name).cloned())
}

/// In-memory sink for a scoped tracing subscriber.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Route events on the current thread here until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_target(true)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
