// ABOUTME: Process-local bounded TTL cache for hot user and server records.
// ABOUTME: Mutex-guarded maps with quartile eviction and a never-expiring static domain.

pub mod cache;

pub use cache::{CacheConfig, CacheDomain, CacheStats, RecordCache};
