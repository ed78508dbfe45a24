//! Shared types for FXGATE.
//!
//! These types form the data model used across all modules: market
//! quotes and signals produced by strategies, broker receipts, and the
//! domain error taxonomy. They carry no behaviour beyond small helpers so
//! that the engine, storage and dashboard modules can depend on them
//! without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Trading mode
// ---------------------------------------------------------------------------

/// Which broker environment the runner targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    #[default]
    Paper,
    Live,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Paper => write!(f, "paper"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}

impl FromStr for TradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "paper" | "practice" | "demo" => Ok(TradingMode::Paper),
            "live" => Ok(TradingMode::Live),
            other => Err(format!("unknown trading mode: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Direction of a trade signal or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Multiplier applied to order units (+1 long, -1 short).
    pub fn sign(&self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A two-sided quote for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub instrument: String,
    pub bid: f64,
    pub ask: f64,
    pub time: DateTime<Utc>,
}

impl Quote {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Spread expressed in pips for this instrument.
    pub fn spread_pips(&self) -> f64 {
        (self.ask - self.bid) / pip_size(&self.instrument)
    }
}

/// Size of one pip for an instrument, using the usual FX conventions
/// (JPY crosses quote to two decimals, metals to two, majors to four).
pub fn pip_size(instrument: &str) -> f64 {
    if instrument.contains("JPY") || instrument.starts_with("XAU") {
        0.01
    } else {
        0.0001
    }
}

/// Everything a strategy sees for one account in one scan cycle.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    /// Quotes fetched in this cycle, keyed by instrument.
    pub current: HashMap<String, Quote>,
    /// Quotes from the previous cycle for the same account, if any.
    pub previous: HashMap<String, Quote>,
}

impl MarketSnapshot {
    pub fn new(quotes: Vec<Quote>, previous: HashMap<String, Quote>) -> Self {
        let current = quotes
            .into_iter()
            .map(|q| (q.instrument.clone(), q))
            .collect();
        Self { current, previous }
    }

    /// Relative move of the mid price since the previous cycle, in basis points.
    pub fn move_bps(&self, instrument: &str) -> Option<f64> {
        let now = self.current.get(instrument)?.mid();
        let before = self.previous.get(instrument)?.mid();
        if before <= 0.0 {
            return None;
        }
        Some((now - before) / before * 10_000.0)
    }
}

/// A trade idea produced by a strategy. Not yet an order: it only becomes
/// one if the execution gate allows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub strategy: String,
    pub instrument: String,
    pub side: Side,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} @ {:.5} (SL {:.5} / TP {:.5})",
            self.strategy, self.side, self.instrument, self.price, self.stop_loss, self.take_profit
        )
    }
}

// ---------------------------------------------------------------------------
// Broker results
// ---------------------------------------------------------------------------

/// Summary returned by the broker handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    pub currency: String,
    pub balance: f64,
}

/// Request for a market order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketOrder {
    pub instrument: String,
    /// Signed units: positive buys, negative sells.
    pub units: i64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Confirmation of a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub instrument: String,
    pub units: i64,
    pub fill_price: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// One rejected field in a config write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors raised by the runtime config store.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A candidate config was rejected. The file on disk was not touched.
    #[error("Config validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    /// The file exists but cannot be parsed or fails validation.
    #[error("Config file {path} is corrupt: {reason}")]
    Corruption { path: String, reason: String },

    #[error("Config I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by broker clients. Callers branch on the kind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker authentication failed: {0}")]
    Auth(String),

    #[error("Broker network error: {0}")]
    Network(String),

    #[error("Invalid broker account: {0}")]
    InvalidAccount(String),

    #[error("Order rejected: {0}")]
    Rejected(String),
}

/// Errors raised while writing or reading the status snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot write to {path} failed: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot serialisation failed: {0}")]
    Serialise(#[from] serde_json::Error),

    #[error("Snapshot read from {path} failed: {reason}")]
    Read { path: String, reason: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
