//! Process configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! This file is static for the life of a process: it names the shared
//! files both processes coordinate through, the API listener, and the
//! configured broker accounts. Secrets (broker tokens, the API bearer
//! token) are referenced by env-var name and resolved at startup.
//!
//! The execution flags that feed the gate come only from the process
//! environment (`ExecutionEnv`), never from any file the API can write.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::types::TradingMode;

/// Top-level process configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    pub runtime_config: PathBuf,
    pub snapshot: PathBuf,
    pub log_file: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    pub port: u16,
    /// Env var holding the bearer token for mutating endpoints.
    pub token_env: Option<String>,
    /// Allow POST endpoints when no token is configured.
    #[serde(default)]
    pub allow_unauthenticated_writes: bool,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    /// Snapshot is stale once older than this many scan intervals.
    #[serde(default = "default_stale_multiple")]
    pub stale_multiple: u32,
    #[serde(default)]
    pub max_iterations: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            stale_multiple: default_stale_multiple(),
            max_iterations: None,
        }
    }
}

fn default_stale_multiple() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccountConfig {
    pub id: String,
    /// Env var holding this account's broker API token.
    pub token_env: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        if config.runner.stale_multiple == 0 {
            anyhow::bail!("runner.stale_multiple must be at least 1");
        }
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

// ---------------------------------------------------------------------------
// Execution environment
// ---------------------------------------------------------------------------

pub const ENV_TRADING_MODE: &str = "TRADING_MODE";
pub const ENV_LIVE_TRADING: &str = "LIVE_TRADING";
pub const ENV_LIVE_TRADING_CONFIRM: &str = "LIVE_TRADING_CONFIRM";
pub const ENV_KILL_SWITCH: &str = "KILL_SWITCH";
pub const ENV_PAPER_EXECUTION: &str = "PAPER_EXECUTION";

/// Execution flags read once at runner startup.
///
/// These are the only inputs besides per-account capability that the
/// execution gate consumes. Unset or unparseable values resolve to the
/// safe side: paper mode, every flag false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionEnv {
    pub trading_mode: TradingMode,
    pub live_trading: bool,
    pub live_trading_confirm: bool,
    pub kill_switch: bool,
    pub paper_execution: bool,
}

impl ExecutionEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source (tests pass a map instead of
    /// touching the process environment).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let trading_mode = match lookup(ENV_TRADING_MODE) {
            None => TradingMode::Paper,
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(value = %raw, error = %e, "Unrecognised TRADING_MODE, using paper");
                TradingMode::Paper
            }),
        };
        let flag = |name: &str| lookup(name).map(|v| parse_flag(&v)).unwrap_or(false);

        Self {
            trading_mode,
            live_trading: flag(ENV_LIVE_TRADING),
            live_trading_confirm: flag(ENV_LIVE_TRADING_CONFIRM),
            kill_switch: flag(ENV_KILL_SWITCH),
            paper_execution: flag(ENV_PAPER_EXECUTION),
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
