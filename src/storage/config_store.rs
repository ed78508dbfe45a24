//! Config store — atomic load/save of the runtime config file.
//!
//! Single writer (the API), any number of readers (the scanner, tooling).
//! Readers rely on atomic rename alone. Writers also hold the store's write
//! lock for the whole load → merge → save sequence, so concurrent API
//! requests are applied one after another and none is lost. Clones of a
//! store share the lock.
//!
//! Save order: validate → serialise → temp write + fsync → rotate the
//! current file into `<name>.bak` → rename temp over the target. Validation
//! failures never reach the disk, and any I/O failure before the rename
//! leaves the visible file as it was.

use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

use super::runtime_config::{RuntimeConfig, RuntimeConfigPatch};
use super::{mtime, write_atomic, write_atomic_with};
use crate::strategy::registry::StrategyRegistry;
use crate::types::ConfigError;

/// Outcome of a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// New content was written and the previous file rotated to `.bak`.
    Written { mtime: SystemTime },
    /// The candidate matched the file byte-for-byte; nothing was touched.
    Unchanged { mtime: SystemTime },
}

impl SaveOutcome {
    pub fn mtime(&self) -> SystemTime {
        match self {
            SaveOutcome::Written { mtime } | SaveOutcome::Unchanged { mtime } => *mtime,
        }
    }
}

/// Where the runner's startup config came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Primary,
    Backup,
    Template,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    registry: StrategyRegistry,
    write_lock: Arc<Mutex<()>>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, registry: StrategyRegistry) -> Self {
        Self {
            path: path.into(),
            registry,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".bak");
        self.path.with_file_name(name)
    }

    /// Parse and validate the config file, returning it with the mtime of
    /// the exact file that was read.
    pub fn load(&self) -> Result<(RuntimeConfig, SystemTime), ConfigError> {
        self.load_from(&self.path)
    }

    /// Parse and validate the rotated backup.
    pub fn load_backup(&self) -> Result<(RuntimeConfig, SystemTime), ConfigError> {
        self.load_from(&self.backup_path())
    }

    fn load_from(&self, path: &Path) -> Result<(RuntimeConfig, SystemTime), ConfigError> {
        let io_err = |source: io::Error| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };

        // Stat through the same handle we read from: a concurrent rename
        // cannot pair new content with an old mtime or vice versa.
        let mut file = File::open(path).map_err(io_err)?;
        let modified = file.metadata().and_then(|m| m.modified()).map_err(io_err)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(io_err)?;

        let config = self.parse(&contents).map_err(|reason| ConfigError::Corruption {
            path: path.display().to_string(),
            reason,
        })?;
        Ok((config, modified))
    }

    fn parse(&self, contents: &str) -> Result<RuntimeConfig, String> {
        let config: RuntimeConfig = serde_json::from_str(contents).map_err(|e| e.to_string())?;
        config.validate(&self.registry).map_err(|e| e.to_string())?;
        Ok(config)
    }

    /// Cheap stat used by the runner every iteration.
    pub fn get_mtime(&self) -> Result<Option<SystemTime>, ConfigError> {
        mtime(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Serialise writers. A panic while holding the lock cannot leave a
    /// half-written file, so a poisoned lock is still usable.
    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validate and atomically persist `candidate`.
    pub fn save(&self, candidate: &RuntimeConfig) -> Result<SaveOutcome, ConfigError> {
        let _guard = self.lock_writes();
        self.save_locked(candidate)
    }

    fn save_locked(&self, candidate: &RuntimeConfig) -> Result<SaveOutcome, ConfigError> {
        candidate.validate(&self.registry)?;
        let bytes = serialise(candidate);

        let io_err = |source: io::Error| ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        };

        let current = match std::fs::read(&self.path) {
            Ok(b) => Some(b),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(io_err(e)),
        };

        if current.as_deref() == Some(bytes.as_slice()) {
            let mtime = self.get_mtime()?.unwrap_or_else(SystemTime::now);
            return Ok(SaveOutcome::Unchanged { mtime });
        }

        let previous_mtime = self.get_mtime()?;
        let backup = self.backup_path();
        write_atomic_with(&self.path, &bytes, || match &current {
            Some(previous) => write_atomic(&backup, previous),
            None => Ok(()),
        })
        .map_err(io_err)?;

        let mtime = self.advance_mtime(previous_mtime)?;
        info!(
            path = %self.path.display(),
            strategy = %candidate.active_strategy_key,
            scan_interval_seconds = candidate.scan_interval_seconds,
            "Runtime config saved"
        );
        Ok(SaveOutcome::Written { mtime })
    }

    /// Two saves inside one tick of a coarse filesystem clock can leave the
    /// same mtime, and the runner would never see the second. Push the new
    /// file's mtime past the old one when that happens.
    fn advance_mtime(&self, previous: Option<SystemTime>) -> Result<SystemTime, ConfigError> {
        let io_err = |source: io::Error| ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        };
        let current = self.get_mtime()?.unwrap_or_else(SystemTime::now);
        let Some(previous) = previous.filter(|p| current <= *p) else {
            return Ok(current);
        };

        let file = File::options().write(true).open(&self.path).map_err(io_err)?;
        file.set_modified(previous + Duration::from_millis(1))
            .map_err(io_err)?;
        Ok(self.get_mtime()?.unwrap_or_else(SystemTime::now))
    }

    /// Load the current config, merge `patch`, validate, persist. The whole
    /// sequence runs under the write lock, so the returned config is what
    /// is on disk once this call returns.
    pub fn apply_patch(
        &self,
        patch: &RuntimeConfigPatch,
    ) -> Result<(RuntimeConfig, SaveOutcome), ConfigError> {
        let _guard = self.lock_writes();
        let (current, _) = self.load()?;
        let next = current.apply(patch, &self.registry)?;
        let outcome = self.save_locked(&next)?;
        Ok((next, outcome))
    }

    /// Write the template if no config file exists yet. Returns true if a
    /// file was created.
    pub fn ensure_exists(&self) -> Result<bool, ConfigError> {
        let _guard = self.lock_writes();
        if self.get_mtime()?.is_some() {
            return Ok(false);
        }
        let template = RuntimeConfig::template(&self.registry);
        self.save_locked(&template)?;
        info!(path = %self.path.display(), "Created runtime config from template");
        Ok(true)
    }

    /// Startup load for the runner: primary file, then backup, then the
    /// in-memory template. A corrupt primary is never overwritten here.
    pub fn load_or_recover(&self) -> (RuntimeConfig, Option<SystemTime>, ConfigSource) {
        match self.load() {
            Ok((cfg, mtime)) => return (cfg, Some(mtime), ConfigSource::Primary),
            Err(e) => warn!(error = %e, "Runtime config unusable, trying backup"),
        }
        match self.load_backup() {
            Ok((cfg, _)) => {
                warn!(path = %self.backup_path().display(), "Running on backup config");
                // The primary's mtime still identifies what is on disk, so a
                // later fix to the primary is picked up as a change.
                let primary_mtime = self.get_mtime().ok().flatten();
                (cfg, primary_mtime, ConfigSource::Backup)
            }
            Err(e) => {
                warn!(error = %e, "Backup config unusable, running on built-in template");
                let primary_mtime = self.get_mtime().ok().flatten();
                (
                    RuntimeConfig::template(&self.registry),
                    primary_mtime,
                    ConfigSource::Template,
                )
            }
        }
    }
}

fn serialise(config: &RuntimeConfig) -> Vec<u8> {
    // Serialising a plain struct of strings and numbers cannot fail.
    let mut json = serde_json::to_string_pretty(config).unwrap_or_default();
    json.push('\n');
    json.into_bytes()
}

/// UTC form of a file mtime, as shown in the snapshot and API.
pub fn mtime_utc(mtime: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(mtime)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
