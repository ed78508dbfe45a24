//! Scanner runner — the main loop.
//!
//! Per iteration: reload the runtime config if its mtime moved → resolve
//! the active strategy → scan every loaded account → gate and maybe
//! execute each signal → write the status snapshot → sleep. Iterations
//! never overlap; a slow broker call just makes that cycle longer.
//!
//! Nothing in a cycle is allowed to stop the loop. Config corruption keeps
//! the last good config, a failing account is skipped for that cycle, and
//! a failed snapshot write is logged and retried next cycle.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

use super::accounts::{capable_count, Account};
use super::executor::{ExecutionReport, Executor};
use super::gate::{ExecutionDecision, ExecutionGate};
use crate::storage::config_store::{mtime_utc, ConfigSource, ConfigStore};
use crate::storage::runtime_config::RuntimeConfig;
use crate::storage::snapshot::{is_weekend, SnapshotWriter, StatusSnapshot};
use crate::strategy::Strategy;
use crate::types::{ConfigError, MarketSnapshot, Quote};

/// Outcome of one scan cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub strategy: String,
    pub scanned_at: DateTime<Utc>,
    pub weekend: bool,
    /// True when the execution policy skipped scanning for the weekend.
    pub skipped: bool,
    pub accounts_scanned: usize,
    pub accounts_failed: usize,
    pub signals_generated: usize,
    pub decision: ExecutionDecision,
    pub execution: ExecutionReport,
}

pub struct ScannerRunner {
    store: ConfigStore,
    gate: ExecutionGate,
    accounts: Vec<Account>,
    writer: SnapshotWriter,
    config: RuntimeConfig,
    /// Mtime of the file `config` was loaded from. `None` while running on
    /// the backup or the template.
    config_mtime: Option<SystemTime>,
    /// Last mtime observed on disk, good or bad, so a corrupt file is
    /// reported once rather than every cycle.
    seen_mtime: Option<SystemTime>,
    previous_quotes: HashMap<String, HashMap<String, Quote>>,
    cycle: u64,
    last_report: Option<CycleReport>,
}

impl ScannerRunner {
    pub fn new(store: ConfigStore, gate: ExecutionGate, accounts: Vec<Account>, writer: SnapshotWriter) -> Self {
        let (config, seen_mtime, source) = store.load_or_recover();
        let config_mtime = match source {
            ConfigSource::Primary => seen_mtime,
            ConfigSource::Backup | ConfigSource::Template => {
                error!(?source, path = %store.path().display(), "Primary runtime config unusable, running on fallback");
                None
            }
        };
        info!(
            run_id = %gate.run_id(),
            strategy = %config.active_strategy_key,
            scan_interval_seconds = config.scan_interval_seconds,
            accounts = accounts.len(),
            execution_capable = capable_count(&accounts),
            "Scanner runner ready"
        );
        Self {
            store,
            gate,
            accounts,
            writer,
            config,
            config_mtime,
            seen_mtime,
            previous_quotes: HashMap::new(),
            cycle: 0,
            last_report: None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Reload the runtime config if its mtime changed since the last look.
    /// Returns true if a new config is now in effect.
    pub fn reload_if_changed(&mut self) -> bool {
        let on_disk = match self.store.get_mtime() {
            Ok(Some(m)) => m,
            Ok(None) => {
                if self.seen_mtime.take().is_some() {
                    warn!(path = %self.store.path().display(), "Runtime config disappeared, keeping current config");
                }
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Could not stat runtime config, keeping current config");
                return false;
            }
        };
        if self.seen_mtime == Some(on_disk) {
            return false;
        }

        match self.store.load() {
            Ok((config, mtime)) => {
                if config != self.config {
                    info!(
                        from = %self.config.active_strategy_key,
                        to = %config.active_strategy_key,
                        scan_interval_seconds = config.scan_interval_seconds,
                        "Runtime config reloaded"
                    );
                }
                self.config = config;
                self.config_mtime = Some(mtime);
                self.seen_mtime = Some(mtime);
                true
            }
            Err(e @ ConfigError::Corruption { .. }) => {
                // Reported once; the next write gives a new mtime.
                self.seen_mtime = Some(on_disk);
                error!(error = %e, strategy = %self.config.active_strategy_key, "Runtime config changed but is unusable, keeping last good config");
                false
            }
            Err(e) => {
                // Transient: leave this version unseen so it is retried.
                warn!(error = %e, strategy = %self.config.active_strategy_key, "Runtime config changed but could not be read, retrying next cycle");
                false
            }
        }
    }

    /// Run one full scan cycle and publish its snapshot.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        self.reload_if_changed();

        let scanned_at = Utc::now();
        let weekend = is_weekend(scanned_at);
        let decision = self.gate.cycle_decision(capable_count(&self.accounts) > 0);

        let mut report = CycleReport {
            cycle: self.cycle,
            strategy: self.config.active_strategy_key.clone(),
            scanned_at,
            weekend,
            skipped: false,
            accounts_scanned: 0,
            accounts_failed: 0,
            signals_generated: 0,
            decision,
            execution: ExecutionReport::default(),
        };

        info!(cycle = self.cycle, strategy = %report.strategy, gate = %decision.label(), "Starting cycle");

        if weekend && self.config.execution_policy.skip_weekends {
            info!(cycle = self.cycle, "Weekend, scanning skipped by execution policy");
            report.skipped = true;
        } else {
            self.scan_accounts(&mut report).await;
        }

        self.publish(&report, false);
        log_cycle_report(&report);
        self.last_report = Some(report.clone());
        report
    }

    async fn scan_accounts(&mut self, report: &mut CycleReport) {
        let registry = self.store.registry();
        let descriptor = match registry.get(&self.config.active_strategy_key) {
            Some(d) => d,
            None => {
                // A validated config cannot name an unknown key; keep scanning
                // on the default rather than stopping.
                error!(key = %self.config.active_strategy_key, "Active strategy not in registry, using default");
                match registry.get(registry.default_key()) {
                    Some(d) => d,
                    None => return,
                }
            }
        };
        report.strategy = descriptor.key.to_string();
        let strategy = descriptor.kind;
        let instruments: Vec<String> = descriptor.instruments.iter().map(|i| i.to_string()).collect();

        let executor = Executor::new(&self.gate);
        let mut remaining_orders = self.config.execution_policy.max_orders_per_cycle;

        for account in &self.accounts {
            let quotes = match account.broker.get_current_prices(&instruments).await {
                Ok(q) => q,
                Err(e) => {
                    warn!(account = %account.id, broker = account.broker.name(), error = %e, "Price fetch failed, skipping account this cycle");
                    report.accounts_failed += 1;
                    continue;
                }
            };
            report.accounts_scanned += 1;

            let previous = self.previous_quotes.remove(&account.id).unwrap_or_default();
            let market = MarketSnapshot::new(quotes, previous);
            let signals = strategy.generate_signals(&market, &self.config.risk);
            debug!(account = %account.id, strategy = %strategy, signals = signals.len(), "Signals generated");
            report.signals_generated += signals.len();

            let executed = executor
                .execute(account, &signals, &self.config.risk, &mut remaining_orders)
                .await;
            report.execution.merge(executed);

            self.previous_quotes.insert(account.id.clone(), market.current);
        }
    }

    fn snapshot(&self, report: &CycleReport, shutdown: bool) -> StatusSnapshot {
        StatusSnapshot {
            run_id: self.gate.run_id(),
            cycle: report.cycle,
            mode: self.gate.env().trading_mode,
            execution_enabled: report.decision.allow,
            execution_reason: report.decision.reason,
            accounts_loaded: self.accounts.len(),
            accounts_execution_capable: capable_count(&self.accounts),
            accounts: self.accounts.iter().map(Account::status).collect(),
            active_strategy_key: report.strategy.clone(),
            last_scan_at: report.scanned_at,
            last_signals_generated: report.signals_generated,
            last_executed_count: report.execution.executed.len(),
            last_failed_count: report.execution.failed.len(),
            weekend_indicator: report.weekend,
            config_mtime: self.config_mtime.map(mtime_utc),
            shutdown,
        }
    }

    fn publish(&self, report: &CycleReport, shutdown: bool) {
        if let Err(e) = self.writer.write(&self.snapshot(report, shutdown)) {
            error!(error = %e, cycle = report.cycle, "Snapshot write failed, skipping this cycle's snapshot");
        }
    }

    /// Final snapshot for graceful shutdown. Marks the file so readers
    /// report the scanner as stopped rather than merely slow.
    pub fn flush_shutdown(&self) {
        let report = match &self.last_report {
            Some(r) => r.clone(),
            None => CycleReport {
                cycle: self.cycle,
                strategy: self.config.active_strategy_key.clone(),
                scanned_at: Utc::now(),
                weekend: is_weekend(Utc::now()),
                skipped: true,
                accounts_scanned: 0,
                accounts_failed: 0,
                signals_generated: 0,
                decision: self.gate.cycle_decision(capable_count(&self.accounts) > 0),
                execution: ExecutionReport::default(),
            },
        };
        self.publish(&report, true);
        info!(cycle = self.cycle, "Final snapshot flushed");
    }

    /// Loop until `shutdown` resolves or `max_iterations` cycles have run.
    /// A shutdown arriving mid-cycle takes effect once that cycle is done.
    pub async fn run<F>(&mut self, max_iterations: Option<u64>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut iterations = 0u64;

        loop {
            self.run_cycle().await;
            iterations += 1;
            if max_iterations.is_some_and(|max| iterations >= max) {
                info!(iterations, "Iteration cap reached");
                break;
            }

            let sleep = Duration::from_secs(self.config.scan_interval_seconds);
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }
        }

        self.flush_shutdown();
    }
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle,
        strategy = %report.strategy,
        weekend = report.weekend,
        skipped = report.skipped,
        accounts = report.accounts_scanned,
        accounts_failed = report.accounts_failed,
        signals = report.signals_generated,
        executed = report.execution.executed.len(),
        failed = report.execution.failed.len(),
        denied = report.execution.denied,
        gate = %report.decision.label(),
        "Cycle complete"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
