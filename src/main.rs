//! FXGATE — market scanner with a file-coordinated control plane.
//!
//! Entry point. Two subcommands share one process config:
//! - `scan` resolves accounts, then runs the scan loop until stopped,
//!   flushing a final snapshot on SIGTERM / Ctrl-C.
//! - `serve` runs the control-plane API over the same files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use tracing::{error, info, warn};
use uuid::Uuid;

use fxgate::config::{AppConfig, ExecutionEnv};
use fxgate::dashboard;
use fxgate::engine::accounts::{capable_count, AccountCapabilityResolver, AccountSpec, OandaFactory};
use fxgate::engine::gate::ExecutionGate;
use fxgate::engine::runner::ScannerRunner;
use fxgate::storage::config_store::ConfigStore;
use fxgate::storage::snapshot::SnapshotWriter;
use fxgate::strategy::registry::StrategyRegistry;

const BANNER: &str = r#"
  _____  __   __  ____      _     _____  _____
 |  ___| \ \ / / / ___|    / \   |_   _|| ____|
 | |_     \ V / | |  _    / _ \    | |  |  _|
 |  _|    / . \ | |_| |  / ___ \   | |  | |___
 |_|     /_/ \_\ \____| /_/   \_\  |_|  |_____|

  Market scanner + execution gate
"#;

#[derive(Debug, Parser)]
#[command(name = "fxgate", version, about = "Market scanner with a file-coordinated control plane")]
struct Cli {
    /// Path to the process config (TOML).
    #[arg(long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scanner loop.
    Scan {
        /// Stop after this many cycles.
        #[arg(long)]
        max_iterations: Option<u64>,
    },
    /// Run the control-plane API.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    match cli.command {
        Command::Scan { max_iterations } => {
            init_logging(Some(&cfg.paths.log_file))?;
            install_panic_logger();
            println!("{BANNER}");
            run_scanner(cfg, max_iterations).await.map_err(|e| {
                error!(error = format!("{e:#}"), "Scanner stopped on an unexpected error");
                e
            })
        }
        Command::Serve => {
            init_logging(None)?;
            run_api(cfg).await
        }
    }
}

async fn run_scanner(cfg: AppConfig, max_iterations: Option<u64>) -> Result<()> {
    let store = ConfigStore::new(&cfg.paths.runtime_config, StrategyRegistry::builtin());
    // A corrupt or unreadable file is left alone; the runner falls back.
    if let Err(e) = store.ensure_exists() {
        warn!(error = %e, "Could not prepare runtime config");
    }

    let env = ExecutionEnv::from_env();
    let gate = ExecutionGate::new(env, Uuid::new_v4());
    info!(
        run_id = %gate.run_id(),
        mode = %env.trading_mode,
        live_trading = env.live_trading,
        live_trading_confirm = env.live_trading_confirm,
        kill_switch = env.kill_switch,
        paper_execution = env.paper_execution,
        "FXGATE scanner starting"
    );

    let specs = AccountSpec::from_config(&cfg.accounts);
    if specs.is_empty() {
        warn!("No active accounts configured; cycles will produce no signals");
    }
    let accounts = AccountCapabilityResolver::new(OandaFactory {
        mode: env.trading_mode,
    })
    .resolve(specs)
    .await;
    info!(
        loaded = accounts.len(),
        execution_capable = capable_count(&accounts),
        synthetic = accounts.iter().filter(|a| a.broker.is_synthetic()).count(),
        gate = %gate.cycle_decision(capable_count(&accounts) > 0).label(),
        "Accounts ready"
    );

    let writer = SnapshotWriter::new(&cfg.paths.snapshot);
    let mut runner = ScannerRunner::new(store, gate, accounts, writer);
    let max_iterations = max_iterations.or(cfg.runner.max_iterations);

    info!(
        interval_secs = runner.config().scan_interval_seconds,
        max_iterations = ?max_iterations,
        "Entering main loop. Press Ctrl+C to stop."
    );
    runner.run(max_iterations, shutdown_signal()?).await;
    info!(cycles = runner.cycle(), "FXGATE scanner shut down cleanly.");
    Ok(())
}

async fn run_api(cfg: AppConfig) -> Result<()> {
    let state = dashboard::context_from_config(&cfg, StrategyRegistry::builtin());
    match state.store.ensure_exists() {
        Ok(true) => info!(path = %state.store.path().display(), "Runtime config created"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "Could not prepare runtime config"),
    }

    let ip: IpAddr = cfg
        .api
        .bind
        .parse()
        .with_context(|| format!("Invalid api.bind address: {}", cfg.api.bind))?;
    dashboard::serve(state, SocketAddr::new(ip, cfg.api.port), shutdown_signal()?).await?;
    info!("Control-plane API shut down cleanly.");
    Ok(())
}

/// Resolves on SIGTERM or Ctrl-C. Handlers are installed before this
/// returns, so a signal during the first cycle is not lost.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send + 'static> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut int = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    Ok(async move {
        tokio::select! {
            _ = term.recv() => {}
            _ = int.recv() => {}
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send + 'static> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
    })
}

/// Route panics through tracing so they reach the log file too.
fn install_panic_logger() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        error!(panic = %panic, "Unexpected panic");
        default_hook(panic);
    }));
}

/// Initialise the `tracing` subscriber. With a log file, output goes to
/// both stdout and the file (appending), without ANSI colours.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    use std::fs::OpenOptions;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fxgate=info"));

    let json_logging = std::env::var("FXGATE_LOG_JSON").is_ok();

    let (writer, ansi) = match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            (BoxMakeWriter::new(std::io::stdout.and(Mutex::new(file))), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .init();
    }
    Ok(())
}
