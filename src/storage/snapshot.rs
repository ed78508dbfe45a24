//! Status snapshot — the scanner's state, published for the API.
//!
//! The scanner is the only writer and rewrites the whole file every cycle
//! with the same temp + rename discipline as the config store. The API
//! reads it verbatim and adds a derived staleness flag so a dead or hung
//! scanner is visible without talking to it.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;
use uuid::Uuid;

use super::write_atomic;
use crate::engine::accounts::AccountStatus;
use crate::engine::gate::GateReason;
use crate::types::{SnapshotError, TradingMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub run_id: Uuid,
    pub cycle: u64,
    pub mode: TradingMode,
    /// Outcome of the gate evaluated in this cycle.
    pub execution_enabled: bool,
    pub execution_reason: GateReason,
    pub accounts_loaded: usize,
    pub accounts_execution_capable: usize,
    pub accounts: Vec<AccountStatus>,
    pub active_strategy_key: String,
    pub last_scan_at: DateTime<Utc>,
    pub last_signals_generated: usize,
    pub last_executed_count: usize,
    pub last_failed_count: usize,
    pub weekend_indicator: bool,
    /// Mtime of the runtime config in effect for this cycle.
    pub config_mtime: Option<DateTime<Utc>>,
    /// Set only on the final flush during graceful shutdown.
    #[serde(default)]
    pub shutdown: bool,
}

/// FX markets close Friday 22:00 UTC and reopen Sunday 22:00 UTC.
pub fn is_weekend(now: DateTime<Utc>) -> bool {
    match now.weekday() {
        Weekday::Fri => now.hour() >= 22,
        Weekday::Sat => true,
        Weekday::Sun => now.hour() < 22,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, snapshot: &StatusSnapshot) -> Result<(), SnapshotError> {
        let mut json = serde_json::to_vec_pretty(snapshot)?;
        json.push(b'\n');
        write_atomic(&self.path, &json).map_err(|source| SnapshotError::Write {
            path: self.path.display().to_string(),
            source,
        })?;
        debug!(cycle = snapshot.cycle, path = %self.path.display(), "Snapshot written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Snapshot as served by the API.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotView {
    pub snapshot: Option<StatusSnapshot>,
    pub stale: bool,
    pub age_seconds: Option<u64>,
    pub stale_after_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SnapshotReader {
    path: PathBuf,
    stale_multiple: u32,
}

impl SnapshotReader {
    pub fn new(path: impl Into<PathBuf>, stale_multiple: u32) -> Self {
        Self {
            path: path.into(),
            stale_multiple: stale_multiple.max(1),
        }
    }

    /// Latest snapshot and the mtime of the file it came from. `None` if the
    /// scanner has never written one.
    pub fn read(&self) -> Result<Option<(StatusSnapshot, SystemTime)>, SnapshotError> {
        let read_err = |reason: String| SnapshotError::Read {
            path: self.path.display().to_string(),
            reason,
        };

        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(read_err(e.to_string())),
        };
        let modified = file
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| read_err(e.to_string()))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| read_err(e.to_string()))?;

        let snapshot = serde_json::from_str(&contents).map_err(|e| read_err(e.to_string()))?;
        Ok(Some((snapshot, modified)))
    }

    /// Read and classify staleness against `scan_interval_seconds`.
    pub fn view(&self, scan_interval_seconds: u64, now: SystemTime) -> Result<SnapshotView, SnapshotError> {
        let stale_after_seconds = scan_interval_seconds.saturating_mul(self.stale_multiple as u64);
        let Some((snapshot, modified)) = self.read()? else {
            return Ok(SnapshotView {
                snapshot: None,
                stale: true,
                age_seconds: None,
                stale_after_seconds,
            });
        };

        // A file from the future (clock skew) counts as fresh.
        let age = now.duration_since(modified).map(|d| d.as_secs()).unwrap_or(0);
        Ok(SnapshotView {
            stale: snapshot.shutdown || age > stale_after_seconds,
            snapshot: Some(snapshot),
            age_seconds: Some(age),
            stale_after_seconds,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
