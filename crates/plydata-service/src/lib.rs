// ABOUTME: Wiring layer for plydata, composing stores and cache behind one facade.
// ABOUTME: Provides env-driven configuration, load-through reads, and the background sweep task.

pub mod config;
pub mod data;
pub mod sweep;

pub use config::{ConfigError, ServiceConfig};
pub use data::{DataLayer, SERVER_STORE_FILE, ServiceError, USER_STORE_FILE};
pub use sweep::spawn_sweeper;

pub use plydata_cache::{CacheConfig, CacheDomain, CacheStats};
pub use plydata_core::Document;
pub use plydata_store::{LoadSource, Loaded, RecordStore, StoreError};
