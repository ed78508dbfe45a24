//! Persistence layer.
//!
//! The scanner and the API share exactly two files: the runtime config
//! (written by the API) and the status snapshot (written by the scanner).
//! Neither is ever edited in place. Every write goes to a temp file in the
//! same directory, is fsynced, and is then renamed over the target, so a
//! reader sees either the old or the new complete file.

pub mod config_store;
pub mod runtime_config;
pub mod snapshot;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Prefix of in-flight temp files. Leftovers from a crash are harmless.
pub const TEMP_PREFIX: &str = ".fxgate-";

/// Directory holding `path`, defaulting to the working directory.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Atomically replace `path` with `bytes`.
///
/// Steps: create a temp file beside the target, write, fsync, then rename
/// over the target. The rename is the only step that changes what readers
/// see. If `before_rename` is given it runs after the temp file is durable
/// and before the rename; an error from it aborts the write and the temp
/// file is removed.
pub fn write_atomic_with<F>(path: &Path, bytes: &[u8], before_rename: F) -> io::Result<()>
where
    F: FnOnce() -> io::Result<()>,
{
    let dir = parent_dir(path);
    fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    before_rename()?;

    tmp.persist(path).map_err(|e| e.error)?;
    sync_dir(&dir);

    debug!(path = %path.display(), bytes = bytes.len(), "Atomic write complete");
    Ok(())
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    write_atomic_with(path, bytes, || Ok(()))
}

/// Make the rename itself durable. Best effort: not every platform lets
/// you open a directory.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

/// Modification time of `path`, or `None` if it does not exist.
pub fn mtime(path: &Path) -> io::Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(meta) => meta.modified().map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_creates_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_atomic(&path, b"first").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first");

        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_write_atomic_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        write_atomic(&path, b"x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_failed_hook_leaves_target_and_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_atomic(&path, b"original").unwrap();

        let err = write_atomic_with(&path, b"replacement", || {
            Err(io::Error::new(io::ErrorKind::Other, "simulated crash"))
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "simulated crash");
        assert_eq!(fs::read(&path).unwrap(), b"original");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_mtime_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(mtime(&dir.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn test_parent_dir_of_bare_filename() {
        assert_eq!(parent_dir(Path::new("config.json")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("data/config.json")), PathBuf::from("data"));
    }
}
