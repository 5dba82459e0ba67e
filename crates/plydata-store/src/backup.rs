// ABOUTME: Timestamped backup copies and rotation for record store files.
// ABOUTME: Keeps the newest ten backups per store; recovery scans them newest-first.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of backups retained per store. Older ones are pruned after every
/// successful save.
pub const BACKUPS_KEPT: usize = 10;

/// Directory holding a store's backups, beside the store file.
pub fn backups_dir(store_path: &Path) -> PathBuf {
    match store_path.parent() {
        Some(parent) => parent.join("backups"),
        None => PathBuf::from("backups"),
    }
}

/// Copy the current store file into `backups/` with a millisecond-timestamp
/// suffix (`{basename}.{unix-millis}.bak`). Returns None when there is no
/// file to back up yet. On a timestamp collision the suffix is bumped until
/// the name is unique, so every save produces a distinct backup.
pub fn create_backup(store_path: &Path) -> io::Result<Option<PathBuf>> {
    if !store_path.exists() {
        return Ok(None);
    }

    let dir = backups_dir(store_path);
    fs::create_dir_all(&dir)?;

    let base = basename(store_path);
    let mut stamp = unix_millis();
    let mut backup_path = dir.join(format!("{base}.{stamp}.bak"));
    while backup_path.exists() {
        stamp += 1;
        backup_path = dir.join(format!("{base}.{stamp}.bak"));
    }

    fs::copy(store_path, &backup_path)?;
    tracing::debug!("created backup {}", backup_path.display());
    Ok(Some(backup_path))
}

/// List a store's backups as (timestamp, path) pairs, newest first.
/// Ordering comes from the numeric timestamp embedded in the filename.
pub fn list_backups(store_path: &Path) -> io::Result<Vec<(u128, PathBuf)>> {
    let dir = backups_dir(store_path);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let prefix = format!("{}.", basename(store_path));
    let mut backups = Vec::new();

    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();

        // Match pattern: {basename}.{timestamp}.bak
        if let Some(rest) = name_str.strip_prefix(&prefix)
            && let Some(stamp_str) = rest.strip_suffix(".bak")
            && let Ok(stamp) = stamp_str.parse::<u128>()
        {
            backups.push((stamp, entry.path()));
        }
    }

    backups.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(backups)
}

/// Delete every backup beyond the newest [`BACKUPS_KEPT`], oldest first.
/// Returns the number removed. Individual deletion failures are logged and
/// skipped; rotation must never fail a save.
pub fn prune_backups(store_path: &Path) -> io::Result<usize> {
    let backups = list_backups(store_path)?;
    let mut removed = 0;

    for (_, path) in backups.iter().skip(BACKUPS_KEPT).rev() {
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!("pruned old backup {}", path.display());
                removed += 1;
            }
            Err(e) => tracing::warn!("failed to prune backup {}: {}", path.display(), e),
        }
    }

    Ok(removed)
}

fn basename(store_path: &Path) -> String {
    store_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
