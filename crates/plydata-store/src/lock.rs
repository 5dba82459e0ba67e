// ABOUTME: Advisory file locking for record stores via exclusively created marker files.
// ABOUTME: Detects stale locks by marker age and guarantees release on every exit path.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A lock marker older than this is presumed abandoned by a crashed writer.
pub const STALE_AFTER: Duration = Duration::from_secs(30);

/// Errors that can occur while acquiring a store lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("store is locked by another writer")]
    Busy,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Contents of a lock marker file, for operators inspecting a wedged store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Exclusive advisory lock on one store file, held for the duration of a
/// single load or save. The marker file is removed on drop, so the lock is
/// released on every exit path, including errors.
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock for `store_path`.
    ///
    /// Acquisition either succeeds immediately, fails fast with
    /// [`LockError::Busy`] while another writer holds a live lock, or
    /// reclaims a stale marker and retries creation exactly once. There is
    /// no retry loop or queueing; retry policy belongs to the caller.
    pub fn acquire(store_path: &Path) -> Result<Self, LockError> {
        let path = lock_path(store_path);

        match Self::try_create(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !is_stale(&path)? {
                    return Err(LockError::Busy);
                }

                tracing::warn!("reclaiming stale lock {}", path.display());
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    // Holder released it between the stat and the unlink.
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(LockError::Io(e)),
                }

                match Self::try_create(&path) {
                    Ok(lock) => Ok(lock),
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(LockError::Busy),
                    Err(e) => Err(LockError::Io(e)),
                }
            }
            Err(e) => Err(LockError::Io(e)),
        }
    }

    fn try_create(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;

        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let json = serde_json::to_string(&info).unwrap_or_default();
        file.write_all(json.as_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::error!("failed to release lock {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Path of the lock marker for a store file (`ranking.json` ->
/// `ranking.json.lock`).
pub fn lock_path(store_path: &Path) -> PathBuf {
    let mut name = store_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Read the holder info out of a store's lock marker, if one exists.
/// Returns None for missing markers and markers with unreadable contents.
pub fn read_info(store_path: &Path) -> Result<Option<LockInfo>, LockError> {
    let path = lock_path(store_path);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LockError::Io(e)),
    };
    Ok(serde_json::from_str(&raw).ok())
}

fn is_stale(path: &Path) -> Result<bool, LockError> {
    match fs::metadata(path) {
        Ok(meta) => {
            let age = meta
                .modified()
                .ok()
                .and_then(|m| SystemTime::now().duration_since(m).ok());
            Ok(age.is_some_and(|a| a > STALE_AFTER))
        }
        // Marker disappeared between create_new failing and the stat; treat
        // as live and let the caller retry the whole operation.
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LockError::Io(e)),
    }
}
