// ABOUTME: Durable whole-document JSON store with validated, lock-protected saves.
// ABOUTME: Atomic replace via temp file + rename, and backup-chain corruption recovery on load.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use plydata_core::validation::MAX_FILE_BYTES;
use plydata_core::{Document, ValidationError, validate_document, validate_serialized_len};
use thiserror::Error;

use crate::backup::{backups_dir, create_backup, list_backups, prune_backups};
use crate::lock::{LockError, StoreLock};

/// Errors that can occur during store operations. None are process-fatal:
/// validation failures and lock contention have no side effects, and I/O
/// failures abort before the primary file is replaced.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where a loaded document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Parsed and validated from the primary file.
    Primary,
    /// The primary file does not exist yet; the document is empty.
    Missing,
    /// The primary file was corrupt; the document came from the newest
    /// valid backup and may be one write stale.
    Backup,
    /// The primary file and every backup were corrupt; the document is
    /// empty.
    AllBackupsInvalid,
}

/// A validated document plus the provenance callers need to react to
/// recovery (log it, alert, or re-save).
#[derive(Debug, Clone)]
pub struct Loaded {
    pub document: Document,
    pub source: LoadSource,
}

impl Loaded {
    /// True when the primary file could not be used as-is.
    pub fn recovered(&self) -> bool {
        matches!(
            self.source,
            LoadSource::Backup | LoadSource::AllBackupsInvalid
        )
    }

    fn empty(source: LoadSource) -> Self {
        Self {
            document: Document::new(),
            source,
        }
    }
}

/// A durable store for one logical domain, backed by exactly one JSON file.
/// Opened once per domain at startup and shared for the process lifetime.
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    /// Open a store at `path`, creating the parent directory and the
    /// `backups/` subdirectory if they do not exist. Does not touch the
    /// store file itself.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(backups_dir(&path))?;
        Ok(Self { path })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate and durably write a whole document.
    ///
    /// Validation runs before any file is touched. The existing file is
    /// backed up, then replaced atomically; on any failure the prior file
    /// is left byte-for-byte intact. Lock contention surfaces as
    /// `StoreError::Lock(LockError::Busy)` and may be retried by the
    /// caller.
    pub fn save(&self, document: &Document) -> Result<(), StoreError> {
        validate_document(document)?;
        let json = serde_json::to_string_pretty(document)?;
        validate_serialized_len(json.len())?;

        let _lock = StoreLock::acquire(&self.path)?;

        create_backup(&self.path)?;
        if let Err(e) = prune_backups(&self.path) {
            tracing::warn!("backup rotation failed for {}: {}", self.path.display(), e);
        }

        self.atomic_replace(json.as_bytes())?;
        tracing::debug!("saved {}", self.path.display());
        Ok(())
    }

    /// Load the current document.
    ///
    /// A missing file yields an empty document. A primary that fails to
    /// parse or validate degrades to the backup chain, newest first; if no
    /// backup validates either, the result is an empty document rather than
    /// an error. The outcome is reported in [`Loaded::source`].
    pub fn load(&self) -> Result<Loaded, StoreError> {
        let _lock = StoreLock::acquire(&self.path)?;

        if !self.path.exists() {
            return Ok(Loaded::empty(LoadSource::Missing));
        }

        match read_document(&self.path) {
            Ok(document) => Ok(Loaded {
                document,
                source: LoadSource::Primary,
            }),
            Err(reason) => {
                tracing::error!(
                    "primary file {} unusable ({}), trying backups",
                    self.path.display(),
                    reason
                );
                self.recover_from_backups()
            }
        }
    }

    fn recover_from_backups(&self) -> Result<Loaded, StoreError> {
        for (_, backup_path) in list_backups(&self.path)? {
            match read_document(&backup_path) {
                Ok(document) => {
                    tracing::warn!(
                        "recovered {} from backup {}",
                        self.path.display(),
                        backup_path.display()
                    );
                    return Ok(Loaded {
                        document,
                        source: LoadSource::Backup,
                    });
                }
                Err(reason) => {
                    tracing::warn!("backup {} unusable: {}", backup_path.display(), reason);
                }
            }
        }

        tracing::error!(
            "no valid backup for {}, starting from an empty document",
            self.path.display()
        );
        Ok(Loaded::empty(LoadSource::AllBackupsInvalid))
    }

    /// Write `bytes` to a temp file in the store's directory, then swap it
    /// in with a rename. The temp file is removed on any failure, so a
    /// crashed or failed save never leaves partial state visible.
    fn atomic_replace(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp_path = self.tmp_path();
        let result = write_and_rename(&tmp_path, &self.path, bytes);
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result.map_err(StoreError::Io)
    }

    fn tmp_path(&self) -> PathBuf {
        let base = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.path.parent() {
            Some(parent) => parent.join(format!(".{base}.tmp")),
            None => PathBuf::from(format!(".{base}.tmp")),
        }
    }
}

/// Parse and validate one store file. Any failure is reported as a reason
/// string; the caller decides whether to fall through to the backup chain.
fn read_document(path: &Path) -> Result<Document, String> {
    let meta = fs::metadata(path).map_err(|e| format!("stat failed: {e}"))?;
    if meta.len() > MAX_FILE_BYTES {
        return Err(format!(
            "file is {} bytes, over the {} byte ceiling",
            meta.len(),
            MAX_FILE_BYTES
        ));
    }

    let raw = fs::read_to_string(path).map_err(|e| format!("read failed: {e}"))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| format!("parse failed: {e}"))?;

    let serde_json::Value::Object(document) = value else {
        return Err("root is not an object".to_string());
    };

    validate_document(&document).map_err(|e| e.to_string())?;
    Ok(document)
}

fn write_and_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    // Windows cannot rename over an existing file; unlink first. The
    // temp-then-rename window is the documented fallback there.
    #[cfg(windows)]
    if target.exists() {
        fs::remove_file(target)?;
    }

    fs::rename(tmp, target)?;

    // Make the rename itself durable. Best-effort: the data is already
    // consistent if the directory fsync fails.
    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::lock_path;
    use serde_json::json;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> RecordStore {
        RecordStore::open(dir.path().join("data").join("ranking.json")).unwrap()
    }

    fn doc(points: i64) -> Document {
        let mut d = Document::new();
        d.insert("42".to_string(), json!({ "points": points }));
        d
    }

    fn too_deep_doc() -> Document {
        let mut value = json!(0);
        for _ in 0..plydata_core::validation::MAX_DEPTH + 1 {
            value = json!({ "k": value });
        }
        let mut d = Document::new();
        d.insert("k".to_string(), value);
        d
    }

    #[test]
    fn open_creates_directories() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(store.path().parent().unwrap().exists());
        assert!(backups_dir(store.path()).exists());
        assert!(!store.path().exists());
    }

    #[test]
    fn load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let loaded = open_store(&dir).load().unwrap();

        assert_eq!(loaded.source, LoadSource::Missing);
        assert!(loaded.document.is_empty());
        assert!(!loaded.recovered());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let d = doc(10);
        store.save(&d).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, LoadSource::Primary);
        assert_eq!(loaded.document, d);
    }

    #[test]
    fn invalid_document_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.save(&doc(10)).unwrap();
        let before = fs::read(store.path()).unwrap();

        let err = store.save(&too_deep_doc()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::TooDeep)
        ));

        assert_eq!(fs::read(store.path()).unwrap(), before);
        // Validation runs before backup, so no backup was taken either.
        assert!(list_backups(store.path()).unwrap().is_empty());
    }

    #[test]
    fn oversized_string_rejected_without_side_effects() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut d = Document::new();
        d.insert("s".to_string(), json!("x".repeat(100_001)));
        let err = store.save(&d).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::StringTooLong(_))
        ));
        assert!(!store.path().exists());
    }

    #[test]
    fn leftover_temp_file_does_not_affect_load() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let d = doc(10);
        store.save(&d).unwrap();

        // Simulate a crash after the temp write but before the rename.
        fs::write(store.tmp_path(), b"{\"42\": {\"points\": 999}").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, LoadSource::Primary);
        assert_eq!(loaded.document, d);
    }

    #[test]
    fn twelve_saves_keep_ten_backups() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        for i in 0..12 {
            store.save(&doc(i)).unwrap();
        }

        // Save 1 had nothing to back up; saves 2..=12 produced 11 backups,
        // pruned down to the newest 10.
        let backups = list_backups(store.path()).unwrap();
        assert_eq!(backups.len(), 10);

        // The newest backup holds the state prior to the final save.
        let newest = read_document(&backups[0].1).unwrap();
        assert_eq!(newest, doc(10));
    }

    #[test]
    fn corrupt_primary_recovers_from_newest_backup() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.save(&doc(10)).unwrap();
        store.save(&doc(25)).unwrap();

        fs::write(store.path(), b"{not json").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, LoadSource::Backup);
        assert!(loaded.recovered());
        assert_eq!(loaded.document, doc(10));
    }

    #[test]
    fn skips_corrupt_backups_for_an_older_valid_one() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.save(&doc(1)).unwrap();
        store.save(&doc(2)).unwrap();
        store.save(&doc(3)).unwrap();

        // Newest backup holds doc(2); corrupt it so recovery must fall
        // through to the one holding doc(1).
        let backups = list_backups(store.path()).unwrap();
        fs::write(&backups[0].1, b"garbage").unwrap();
        fs::write(store.path(), b"{not json").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, LoadSource::Backup);
        assert_eq!(loaded.document, doc(1));
    }

    #[test]
    fn no_valid_backup_falls_back_to_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.save(&doc(10)).unwrap();
        fs::write(store.path(), b"{not json").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, LoadSource::AllBackupsInvalid);
        assert!(loaded.document.is_empty());
    }

    #[test]
    fn non_object_root_triggers_recovery() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.save(&doc(10)).unwrap();
        store.save(&doc(25)).unwrap();
        fs::write(store.path(), b"[1, 2, 3]").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, LoadSource::Backup);
        assert_eq!(loaded.document, doc(10));
    }

    #[test]
    fn held_lock_makes_save_fail_busy() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.save(&doc(10)).unwrap();

        let _held = StoreLock::acquire(store.path()).unwrap();

        let err = store.save(&doc(11)).unwrap_err();
        assert!(matches!(err, StoreError::Lock(LockError::Busy)));

        let err = store.load().unwrap_err();
        assert!(matches!(err, StoreError::Lock(LockError::Busy)));
    }

    #[test]
    fn save_succeeds_after_lock_release() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let held = StoreLock::acquire(store.path()).unwrap();
        assert!(matches!(
            store.save(&doc(10)),
            Err(StoreError::Lock(LockError::Busy))
        ));
        drop(held);

        store.save(&doc(10)).unwrap();
        assert_eq!(store.load().unwrap().document, doc(10));
    }

    #[test]
    fn stale_lock_does_not_block_save() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let marker = lock_path(store.path());
        fs::write(&marker, b"").unwrap();
        let file = fs::OpenOptions::new().write(true).open(&marker).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(31))
            .unwrap();
        drop(file);

        store.save(&doc(10)).unwrap();
        assert_eq!(store.load().unwrap().document, doc(10));
        // The save's own lock was released afterwards.
        assert!(!marker.exists());
    }
}
