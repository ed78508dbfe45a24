//! Operator scenarios run end to end through the real files.

use futures::StreamExt;
use secrecy::SecretString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tower::ServiceExt;

use fxgate::engine::accounts::{Account, AccountCapabilityResolver, AccountSpec};
use fxgate::engine::gate::GateReason;
use fxgate::platforms::BrokerClient;
use fxgate::storage::{write_atomic_with, TEMP_PREFIX};
use fxgate::types::BrokerError;

use crate::harness::{env, CapturedLogs, Harness};
use crate::mock_broker::MockBroker;

const LIVE_ACCOUNT: &str = "101-004-7654321-001";
const SECOND_ACCOUNT: &str = "101-004-7654321-002";

/// Synthetic credential-shaped string; not a real key.
const FAKE_KEY: &str = "a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0";

fn spec(id: &str) -> AccountSpec {
    AccountSpec {
        id: id.to_string(),
        token: Some(SecretString::new("broker-token".to_string())),
    }
}

/// Resolve `specs`, handing out clones of the mock registered for each id
/// and counting how often the factory is asked for a connection.
async fn resolve(specs: Vec<AccountSpec>, brokers: Vec<(&str, MockBroker)>) -> (Vec<Account>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let brokers: Vec<(String, MockBroker)> = brokers
        .into_iter()
        .map(|(id, b)| (id.to_string(), b))
        .collect();
    let factory = move |id: &str, _: SecretString| -> Result<Box<dyn BrokerClient>, BrokerError> {
        counter.fetch_add(1, Ordering::SeqCst);
        brokers
            .iter()
            .find(|(known, _)| known == id)
            .map(|(_, b)| Box::new(b.clone()) as Box<dyn BrokerClient>)
            .ok_or_else(|| BrokerError::InvalidAccount(id.to_string()))
    };
    let accounts = AccountCapabilityResolver::new(factory).resolve(specs).await;
    (accounts, calls)
}

#[tokio::test]
async fn test_strategy_switch_reaches_scanner_and_status() {
    let h = Harness::new();
    let (code, _) = h.post("/api/config", r#"{"scan_interval_seconds":30}"#).await;
    assert_eq!(code, 200);
    let broker = MockBroker::new();
    let (accounts, _) = resolve(vec![spec(LIVE_ACCOUNT)], vec![(LIVE_ACCOUNT, broker.clone())]).await;
    let mut runner = h.runner(env(&[]), accounts);
    assert_eq!(runner.config().scan_interval_seconds, 30);

    runner.run_cycle().await;
    let (_, status) = h.get("/api/status").await;
    assert_eq!(status["snapshot"]["active_strategy_key"], "momentum");
    assert_eq!(status["config_drift"], false);

    let (code, body) = h.post("/api/config", r#"{"active_strategy_key":"gold"}"#).await;
    assert_eq!(code, 200);
    assert_eq!(body["changed"], true);

    // Written but not yet picked up.
    let (_, status) = h.get("/api/status").await;
    assert_eq!(status["snapshot"]["active_strategy_key"], "momentum");
    assert_eq!(status["config_drift"], true);

    let report = runner.run_cycle().await;
    assert_eq!(report.strategy, "gold");
    assert_eq!(runner.config().active_strategy_key, "gold");

    let (_, status) = h.get("/api/status").await;
    assert_eq!(status["snapshot"]["active_strategy_key"], "gold");
    assert_eq!(status["snapshot"]["cycle"], 2);
    assert_eq!(status["config_drift"], false);
    assert_eq!(status["stale"], false);
    assert_eq!(status["stale_after_seconds"], 90);
    assert_eq!(status["execution_label"], "signals-only: SIGNALS_ONLY_MODE");
}

#[tokio::test]
async fn test_live_without_confirmation_never_orders() {
    let h = Harness::new();
    let broker = MockBroker::new().with_moves(&[0.0, 10.0]);
    let (accounts, _) = resolve(vec![spec(LIVE_ACCOUNT)], vec![(LIVE_ACCOUNT, broker.clone())]).await;
    assert!(accounts[0].execution_capable);

    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let mut runner = h.runner(env(&[("TRADING_MODE", "live"), ("LIVE_TRADING", "true")]), accounts);
    runner.run_cycle().await;
    let report = runner.run_cycle().await;

    assert_eq!(report.signals_generated, 3);
    assert_eq!(report.execution.denied, 3);
    assert_eq!(broker.price_calls(), 2);
    assert!(broker.orders().is_empty());

    let snapshot = h.snapshot();
    assert!(!snapshot.execution_enabled);
    assert_eq!(snapshot.execution_reason, GateReason::LiveNotDualConfirmed);
    assert_eq!(snapshot.last_signals_generated, 3);
    assert_eq!(snapshot.last_executed_count, 0);

    let captured = logs.contents();
    assert!(captured.contains("fxgate::gate"));
    assert!(captured.contains("LIVE_NOT_DUAL_CONFIRMED"));
    assert!(!captured.contains("LIVE_EXECUTING"));
}

#[tokio::test]
async fn test_kill_switch_overrides_full_live_confirmation() {
    let h = Harness::new();
    let broker = MockBroker::new().with_moves(&[0.0, 10.0]);
    let (accounts, _) = resolve(vec![spec(LIVE_ACCOUNT)], vec![(LIVE_ACCOUNT, broker.clone())]).await;
    let mut runner = h.runner(
        env(&[
            ("TRADING_MODE", "live"),
            ("LIVE_TRADING", "1"),
            ("LIVE_TRADING_CONFIRM", "yes"),
            ("KILL_SWITCH", "true"),
        ]),
        accounts,
    );
    runner.run_cycle().await;
    runner.run_cycle().await;

    assert!(broker.orders().is_empty());
    assert_eq!(h.snapshot().execution_reason, GateReason::KillSwitch);
}

#[tokio::test]
async fn test_placeholder_account_makes_no_network_calls() {
    let h = Harness::new();
    let (accounts, factory_calls) = resolve(vec![spec("your-account-id")], vec![]).await;
    let mut runner = h.runner(env(&[("PAPER_EXECUTION", "true")]), accounts);

    runner.run_cycle().await;
    runner.run_cycle().await;

    assert_eq!(factory_calls.load(Ordering::SeqCst), 0);
    let snapshot = h.snapshot();
    assert_eq!(snapshot.accounts_loaded, 1);
    assert_eq!(snapshot.accounts_execution_capable, 0);
    assert_eq!(snapshot.accounts[0].broker, "paper");
    assert!(!snapshot.accounts[0].execution_capable);
    assert_eq!(snapshot.last_executed_count, 0);
    assert_eq!(snapshot.execution_reason, GateReason::SignalsOnlyMode);
}

#[tokio::test]
async fn test_paper_execution_orders_only_on_capable_accounts() {
    let h = Harness::new();
    let broker = MockBroker::new().with_moves(&[0.0, 10.0]);
    let (accounts, factory_calls) = resolve(
        vec![spec("your-account-id"), spec(LIVE_ACCOUNT)],
        vec![(LIVE_ACCOUNT, broker.clone())],
    )
    .await;
    assert_eq!(factory_calls.load(Ordering::SeqCst), 1);

    let mut runner = h.runner(env(&[("PAPER_EXECUTION", "true")]), accounts);
    runner.run_cycle().await;
    let report = runner.run_cycle().await;

    let orders = broker.orders();
    assert_eq!(orders.len(), 3);
    assert!(orders.iter().all(|o| o.units.abs() == 1_000));
    assert!(report.execution.executed.iter().all(|e| e.account == LIVE_ACCOUNT));

    let snapshot = h.snapshot();
    assert!(snapshot.execution_enabled);
    assert_eq!(snapshot.execution_reason, GateReason::PaperExecuting);
    assert_eq!(snapshot.accounts_execution_capable, 1);
    assert_eq!(snapshot.last_executed_count, 3);
}

#[tokio::test]
async fn test_failing_accounts_are_isolated() {
    let h = Harness::new();
    let good = MockBroker::new();
    let bad = MockBroker::failing_handshake(BrokerError::Auth("401 Unauthorized".into()));
    let (accounts, _) = resolve(
        vec![spec(LIVE_ACCOUNT), spec(SECOND_ACCOUNT), spec("changeme")],
        vec![(LIVE_ACCOUNT, bad.clone()), (SECOND_ACCOUNT, good.clone())],
    )
    .await;

    let mut runner = h.runner(env(&[]), accounts);
    let report = runner.run_cycle().await;
    assert_eq!(report.accounts_scanned, 3);

    let snapshot = h.snapshot();
    assert_eq!(snapshot.accounts_loaded, 3);
    assert_eq!(snapshot.accounts_execution_capable, 1);
    let demoted = &snapshot.accounts[0];
    assert_eq!(demoted.id, LIVE_ACCOUNT);
    assert!(!demoted.execution_capable);
    assert!(demoted.reason.as_deref().unwrap().contains("authentication"));
    assert_eq!(demoted.broker, "paper");
    assert!(snapshot.accounts[1].execution_capable);
    assert_eq!(good.handshakes(), 1);
    assert_eq!(bad.handshakes(), 1);

    // The rejected token is not used again after the handshake.
    runner.run_cycle().await;
    assert_eq!(bad.price_calls(), 0);
    assert_eq!(good.price_calls(), 2);
}

#[tokio::test]
async fn test_repeated_identical_write_rotates_backup_once() {
    let h = Harness::new();
    let store = h.store();

    let (code, first) = h.post("/api/config", r#"{"active_strategy_key":"mean_reversion"}"#).await;
    assert_eq!(code, 200);
    assert_eq!(first["changed"], true);
    let backup_after_first = std::fs::read(store.backup_path()).unwrap();
    let primary_after_first = std::fs::read(store.path()).unwrap();
    let mtime_after_first = store.get_mtime().unwrap();

    let (code, second) = h.post("/api/config", r#"{"active_strategy_key":"mean_reversion"}"#).await;
    assert_eq!(code, 200);
    assert_eq!(second["changed"], false);
    assert_eq!(second["config_mtime"], first["config_mtime"]);

    assert_eq!(std::fs::read(store.backup_path()).unwrap(), backup_after_first);
    assert_eq!(std::fs::read(store.path()).unwrap(), primary_after_first);
    assert_eq!(store.get_mtime().unwrap(), mtime_after_first);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_writes_are_both_applied() {
    let h = Harness::new();
    for round in 0..25u32 {
        let stop_loss = 21 + round;
        let strategy_body = r#"{"active_strategy_key":"gold"}"#.to_string();
        let risk_body = format!(r#"{{"risk":{{"stop_loss_pips":{stop_loss}}}}}"#);
        let reset_body = r#"{"active_strategy_key":"momentum","risk":{"stop_loss_pips":20}}"#;

        let (code, _) = h.post("/api/config", reset_body).await;
        assert_eq!(code, 200);

        let ((a, _), (b, _)) = tokio::join!(
            h.post("/api/config", &strategy_body),
            h.post("/api/config", &risk_body),
        );
        assert_eq!((a, b), (200, 200));

        let (config, _) = h.store().load().unwrap();
        assert_eq!(config.active_strategy_key, "gold", "round {round}");
        assert_eq!(config.risk.stop_loss_pips, stop_loss as f64, "round {round}");

        let (_, served) = h.get("/api/config").await;
        assert_eq!(served["active_strategy_key"], "gold");
        assert_eq!(served["risk"]["stop_loss_pips"], stop_loss as f64);
    }
}

#[tokio::test]
async fn test_interrupted_write_leaves_config_intact() {
    let h = Harness::new();
    let store = h.store();
    let before = std::fs::read(store.path()).unwrap();

    let result = write_atomic_with(store.path(), b"{\"active_strategy_key\":", || {
        Err(std::io::Error::other("killed before rename"))
    });
    assert!(result.is_err());
    assert_eq!(std::fs::read(store.path()).unwrap(), before);

    // A temp file orphaned by a real crash is ignored by both sides.
    std::fs::write(h.dir.path().join(format!("{TEMP_PREFIX}orphan.tmp")), b"{garbage").unwrap();
    let (code, config) = h.get("/api/config").await;
    assert_eq!(code, 200);
    assert_eq!(config["active_strategy_key"], "momentum");

    let mut runner = h.runner(env(&[]), vec![]);
    assert_eq!(runner.run_cycle().await.strategy, "momentum");
}

#[test]
fn test_readers_never_see_a_partial_config() {
    let h = Harness::new();
    let writer_store = h.store();
    let reader_store = h.store();

    let writer = std::thread::spawn(move || {
        for i in 0..100 {
            let key = if i % 2 == 0 { "gold" } else { "momentum" };
            writer_store
                .apply_patch(&fxgate::storage::runtime_config::RuntimeConfigPatch::strategy(key))
                .unwrap();
        }
    });

    let mut reads = 0;
    while !writer.is_finished() || reads < 100 {
        let (config, _) = reader_store.load().expect("every read sees a complete file");
        assert!(config.active_strategy_key == "gold" || config.active_strategy_key == "momentum");
        reads += 1;
    }
    writer.join().unwrap();
}

#[tokio::test]
async fn test_status_goes_stale_when_scanner_stops_writing() {
    let h = Harness::new();
    let mut runner = h.runner(env(&[]), vec![]);
    runner.run_cycle().await;

    let (_, status) = h.get("/api/status").await;
    assert_eq!(status["stale"], false);

    // Template interval is 60s with a multiple of 3.
    let old = SystemTime::now() - Duration::from_secs(600);
    std::fs::File::options()
        .write(true)
        .open(h.snapshot_path())
        .unwrap()
        .set_modified(old)
        .unwrap();

    let (_, status) = h.get("/api/status").await;
    assert_eq!(status["stale"], true);
    assert_eq!(status["stale_after_seconds"], 180);
    assert!(status["age_seconds"].as_u64().unwrap() >= 600);
}

#[tokio::test]
async fn test_shutdown_flush_marks_snapshot_stale() {
    let h = Harness::new();
    let mut runner = h.runner(env(&[]), vec![]);
    runner.run(Some(1), std::future::pending()).await;

    let (_, status) = h.get("/api/status").await;
    assert_eq!(status["snapshot"]["shutdown"], true);
    assert_eq!(status["stale"], true);
}

#[tokio::test]
async fn test_api_never_returns_secrets() {
    let h = Harness::new();
    let notes = format!("rotated key {FAKE_KEY} today");
    let body = serde_json::json!({ "execution_policy": { "notes": notes } }).to_string();
    let (code, written) = h.post("/api/config", &body).await;
    assert_eq!(code, 200);
    assert!(!written.to_string().contains(FAKE_KEY));

    let (code, config) = h.get("/api/config").await;
    assert_eq!(code, 200);
    let text = config.to_string();
    assert!(!text.contains(FAKE_KEY));
    assert!(text.contains("[REDACTED]"));

    let (_, status) = h.get("/api/status").await;
    assert!(!status.to_string().contains(FAKE_KEY));
}

#[tokio::test]
async fn test_log_stream_redacts_secrets() {
    let h = Harness::new();
    std::fs::write(
        h.log_path(),
        format!(
            "INFO fxgate: handshake account=101-004-7654321-001\n\
             WARN fxgate: retrying with Authorization: Bearer {FAKE_KEY}\n\
             WARN fxgate: raw {FAKE_KEY} seen\n\
             INFO fxgate: Cycle complete cycle=9\n"
        ),
    )
    .unwrap();

    let req = axum::http::Request::builder()
        .uri("/api/logs/stream?lines=10")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = h.api().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200);

    let mut stream = resp.into_body().into_data_stream();
    let mut received = String::new();
    while !received.contains("cycle=9") {
        let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        received.push_str(&String::from_utf8_lossy(&chunk));
    }
    assert!(received.contains("account=101-004-7654321-001"));
    assert!(received.contains("[REDACTED]"));
    assert!(!received.contains(FAKE_KEY));
}
