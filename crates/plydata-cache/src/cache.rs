// ABOUTME: Bounded, TTL-based read accelerator over the user and server store domains.
// ABOUTME: Never authoritative; a miss falls through to the durable store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

/// TTL and capacity bounds per domain. Defaults match production; tests
/// construct tighter configs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub user_ttl: Duration,
    pub server_ttl: Duration,
    pub user_capacity: usize,
    pub server_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            user_ttl: Duration::from_secs(300),
            server_ttl: Duration::from_secs(600),
            user_capacity: 1000,
            server_capacity: 500,
        }
    }
}

/// The two expiring cache domains. Static reference data is a separate,
/// unexpiring map populated once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheDomain {
    User,
    Server,
}

/// Entry counts and a rough memory estimate, for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub users_cached: usize,
    pub servers_cached: usize,
    pub static_items: usize,
    pub memory_estimate_mb: f64,
}

struct Entry {
    value: Value,
    written_at: Instant,
}

#[derive(Default)]
struct Domains {
    user: HashMap<u64, Entry>,
    server: HashMap<u64, Entry>,
}

impl Domains {
    fn map(&self, domain: CacheDomain) -> &HashMap<u64, Entry> {
        match domain {
            CacheDomain::User => &self.user,
            CacheDomain::Server => &self.server,
        }
    }

    fn map_mut(&mut self, domain: CacheDomain) -> &mut HashMap<u64, Entry> {
        match domain {
            CacheDomain::User => &mut self.user,
            CacheDomain::Server => &mut self.server,
        }
    }
}

/// In-process cache over one or more store domains.
///
/// One mutex guards every expiring domain's map and no I/O happens while
/// it is held, so every operation is short, non-blocking, and safe to call
/// from latency-sensitive paths. Values are cloned on the way in and out;
/// mutating a returned value never affects cached state. The cache holds
/// no state across restarts and is never the source of truth.
pub struct RecordCache {
    config: CacheConfig,
    domains: Mutex<Domains>,
    // Immutable after construction, so reads need no lock.
    static_data: HashMap<String, Value>,
}

impl RecordCache {
    /// Build a cache with the given bounds, populating the static domain
    /// from `static_data` (read-only reference data like trick lists).
    pub fn new(config: CacheConfig, static_data: HashMap<String, Value>) -> Self {
        tracing::debug!("cache initialized with {} static entries", static_data.len());
        Self {
            config,
            domains: Mutex::new(Domains::default()),
            static_data,
        }
    }

    /// Return a copy of the cached value if present and younger than the
    /// domain's TTL.
    pub fn get(&self, domain: CacheDomain, id: u64) -> Option<Value> {
        let domains = self.lock();
        let entry = domains.map(domain).get(&id)?;
        if entry.written_at.elapsed() < self.ttl(domain) {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Store a copy of `value` with the current time. At capacity, the
    /// oldest quartile of the domain (by last-write timestamp) is evicted
    /// first — a cheap LRU approximation, acceptable because a miss just
    /// falls through to the store.
    pub fn put(&self, domain: CacheDomain, id: u64, value: Value) {
        let capacity = self.capacity(domain);
        let mut domains = self.lock();
        let map = domains.map_mut(domain);

        if map.len() >= capacity {
            let evicted = evict_oldest_quartile(map);
            tracing::debug!("evicted {} oldest {:?} cache entries", evicted, domain);
        }

        map.insert(
            id,
            Entry {
                value,
                written_at: Instant::now(),
            },
        );
    }

    /// Drop an entry immediately. Callers invoke this (or re-`put`) after
    /// every authoritative store mutation; the cache does not write
    /// through.
    pub fn invalidate(&self, domain: CacheDomain, id: u64) {
        self.lock().map_mut(domain).remove(&id);
    }

    /// Static reference data lookup. Never expires, never evicted.
    pub fn get_static(&self, key: &str) -> Option<Value> {
        self.static_data.get(key).cloned()
    }

    /// Purge every entry past its domain TTL, returning the number removed.
    /// Meant to run on a periodic background schedule; sharing the one
    /// mutex with regular operations keeps runs from overlapping.
    pub fn sweep_expired(&self) -> usize {
        let mut domains = self.lock();
        let mut removed = 0;

        for domain in [CacheDomain::User, CacheDomain::Server] {
            let ttl = self.ttl(domain);
            let map = domains.map_mut(domain);
            let before = map.len();
            map.retain(|_, entry| entry.written_at.elapsed() < ttl);
            removed += before - map.len();
        }

        removed
    }

    /// Entry counts and a rough per-entry memory estimate.
    pub fn stats(&self) -> CacheStats {
        let domains = self.lock();
        let users_cached = domains.user.len();
        let servers_cached = domains.server.len();

        // Rough heuristic: ~1KB per user record, ~2KB per server config,
        // ~100KB of static data.
        let estimate = users_cached as f64 * 0.001 + servers_cached as f64 * 0.002 + 0.1;

        CacheStats {
            users_cached,
            servers_cached,
            static_items: self.static_data.len(),
            memory_estimate_mb: (estimate * 100.0).round() / 100.0,
        }
    }

    fn ttl(&self, domain: CacheDomain) -> Duration {
        match domain {
            CacheDomain::User => self.config.user_ttl,
            CacheDomain::Server => self.config.server_ttl,
        }
    }

    fn capacity(&self, domain: CacheDomain) -> usize {
        match domain {
            CacheDomain::User => self.config.user_capacity,
            CacheDomain::Server => self.config.server_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Domains> {
        // A panic while holding the guard poisons the mutex; the maps are
        // still structurally sound, so keep serving.
        self.domains.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Remove the oldest 25% of entries (minimum one) by write timestamp.
/// Returns the number evicted.
fn evict_oldest_quartile(map: &mut HashMap<u64, Entry>) -> usize {
    let count = (map.len() / 4).max(1);

    let mut by_age: Vec<(u64, Instant)> = map
        .iter()
        .map(|(id, entry)| (*id, entry.written_at))
        .collect();
    by_age.sort_by_key(|(_, written_at)| *written_at);

    for (id, _) in by_age.into_iter().take(count) {
        map.remove(&id);
    }

    count
}
