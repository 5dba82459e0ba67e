// ABOUTME: Persistence layer for plydata, handling durable whole-document JSON storage.
// ABOUTME: Provides advisory file locking, backup rotation, atomic replace, and corruption recovery.

pub mod backup;
pub mod lock;
pub mod store;

pub use backup::{BACKUPS_KEPT, create_backup, list_backups, prune_backups};
pub use lock::{LockError, LockInfo, STALE_AFTER, StoreLock};
pub use store::{LoadSource, Loaded, RecordStore, StoreError};
