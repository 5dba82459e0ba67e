// ABOUTME: Application-facing data layer combining durable stores with the record cache.
// ABOUTME: Load-through reads, write-with-invalidate saves, and static reference data loading.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use plydata_cache::{CacheConfig, CacheDomain, CacheStats, RecordCache};
use plydata_store::{RecordStore, StoreError};
use serde_json::Value;
use thiserror::Error;

use crate::config::ServiceConfig;

/// Store file holding per-user progression records, keyed by user id.
pub const USER_STORE_FILE: &str = "user_ranks.json";
/// Store file holding per-server configuration, keyed by guild id.
pub const SERVER_STORE_FILE: &str = "server_configs.json";

/// Errors surfaced by the data layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One store per domain plus the process-local cache, constructed once at
/// startup and passed by reference to every consumer. The stores are
/// ground truth; the cache only accelerates reads.
pub struct DataLayer {
    users: RecordStore,
    servers: RecordStore,
    cache: RecordCache,
}

impl DataLayer {
    /// Open both domain stores under the configured data directory and
    /// populate the cache's static domain from the static directory.
    pub fn open(config: &ServiceConfig) -> Result<Self, ServiceError> {
        Self::open_with_cache(config, CacheConfig::default())
    }

    /// Like [`DataLayer::open`] with explicit cache bounds. Tests use this
    /// to shrink TTLs and capacities.
    pub fn open_with_cache(
        config: &ServiceConfig,
        cache_config: CacheConfig,
    ) -> Result<Self, ServiceError> {
        let users = RecordStore::open(config.data_dir.join(USER_STORE_FILE))?;
        let servers = RecordStore::open(config.data_dir.join(SERVER_STORE_FILE))?;

        let static_data = match &config.static_dir {
            Some(dir) => load_static_dir(dir)?,
            None => HashMap::new(),
        };

        Ok(Self {
            users,
            servers,
            cache: RecordCache::new(cache_config, static_data),
        })
    }

    /// A user's record, from cache when fresh, else loaded through the
    /// store and cached.
    pub fn user_record(&self, id: u64) -> Result<Option<Value>, ServiceError> {
        self.record(CacheDomain::User, &self.users, id)
    }

    /// A server's configuration, from cache when fresh, else loaded
    /// through the store and cached.
    pub fn server_config(&self, id: u64) -> Result<Option<Value>, ServiceError> {
        self.record(CacheDomain::Server, &self.servers, id)
    }

    /// Durably write a user's record, then invalidate its cache entry.
    pub fn save_user_record(&self, id: u64, value: Value) -> Result<(), ServiceError> {
        self.save_record(CacheDomain::User, &self.users, id, value)
    }

    /// Durably write a server's configuration, then invalidate its cache
    /// entry.
    pub fn save_server_config(&self, id: u64, value: Value) -> Result<(), ServiceError> {
        self.save_record(CacheDomain::Server, &self.servers, id, value)
    }

    /// Static reference data (trick lists, fact lists) loaded at startup.
    pub fn get_static(&self, key: &str) -> Option<Value> {
        self.cache.get_static(key)
    }

    /// Purge expired cache entries; used by the background sweeper.
    pub fn sweep_expired(&self) -> usize {
        self.cache.sweep_expired()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn user_store(&self) -> &RecordStore {
        &self.users
    }

    pub fn server_store(&self) -> &RecordStore {
        &self.servers
    }

    fn record(
        &self,
        domain: CacheDomain,
        store: &RecordStore,
        id: u64,
    ) -> Result<Option<Value>, ServiceError> {
        if let Some(value) = self.cache.get(domain, id) {
            return Ok(Some(value));
        }

        let loaded = store.load()?;
        if loaded.recovered() {
            tracing::warn!(
                "loaded {} via {:?}",
                store.path().display(),
                loaded.source
            );
        }

        match loaded.document.get(&id.to_string()) {
            Some(value) => {
                self.cache.put(domain, id, value.clone());
                Ok(Some(value.clone()))
            }
            None => Ok(None),
        }
    }

    fn save_record(
        &self,
        domain: CacheDomain,
        store: &RecordStore,
        id: u64,
        value: Value,
    ) -> Result<(), ServiceError> {
        let mut document = store.load()?.document;
        document.insert(id.to_string(), value);
        store.save(&document)?;

        // The cache still holds the pre-write record until this point; the
        // store stays ground truth either way.
        self.cache.invalidate(domain, id);
        Ok(())
    }
}

/// Read every `*.json` file in `dir` into the static domain, keyed by file
/// stem. Unparseable files are logged and skipped; a missing directory is
/// an empty domain.
fn load_static_dir(dir: &Path) -> Result<HashMap<String, Value>, ServiceError> {
    let mut data = HashMap::new();
    if !dir.exists() {
        tracing::warn!("static dir {} does not exist", dir.display());
        return Ok(data);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_none_or(|e| e != "json") {
            continue;
        }

        let raw = fs::read_to_string(&path)?;
        match serde_json::from_str(&raw) {
            Ok(value) => {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    data.insert(stem.to_string(), value);
                }
            }
            Err(e) => tracing::warn!("skipping unparseable static file {}: {}", path.display(), e),
        }
    }

    tracing::info!("loaded {} static reference entries", data.len());
    Ok(data)
}
