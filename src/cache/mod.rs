//! # Cache
//!
//! Generic TTL caching used across the controller.
//!
//! - [`TtlCache`] is the typed building block behind [`MemoryCache`]
//! - [`CacheProvider`] is the object-safe, JSON-valued interface to the process-wide cache
//! - [`CacheFactory`] owns the single process-wide instance
//!
//! Writes are visible to subsequent reads as soon as the call returns. Callers
//! must still not rely on that, since other providers may buffer writes.

mod memory;
mod ttl;

pub use memory::MemoryCache;
pub use ttl::TtlCache;

use crate::constants::{DEFAULT_CACHE_JANITOR_INTERVAL_SECS, DEFAULT_CACHE_MAX_ENTRIES};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, warn};

/// Object-safe cache interface
pub trait CacheProvider: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &str) -> Option<Value>;

    /// Store a value without expiry
    fn set(&self, key: &str, value: Value) -> bool;

    /// Store a value that expires after `ttl`; a zero `ttl` means no expiry
    fn set_with_ttl(&self, key: &str, value: Value, ttl: Duration) -> bool;

    fn delete(&self, key: &str);

    /// Best-effort flush of every entry
    fn clear(&self);
}

/// Capacity configuration of the process-wide cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries (0 = unbounded)
    pub max_entries: usize,
    /// Interval of the background eviction task
    pub janitor_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            janitor_interval: Duration::from_secs(DEFAULT_CACHE_JANITOR_INTERVAL_SECS),
        }
    }
}

/// Owner of a single cache instance
///
/// The first `get_or_init` call decides the configuration; later calls get the
/// same instance and a warning if they asked for something different.
#[derive(Debug, Default)]
pub struct CacheFactory {
    instance: OnceLock<(CacheConfig, Arc<dyn CacheProvider>)>,
}

impl CacheFactory {
    pub const fn new() -> Self {
        Self {
            instance: OnceLock::new(),
        }
    }

    pub fn get_or_init(&self, config: CacheConfig) -> Arc<dyn CacheProvider> {
        let (active, cache) = self.instance.get_or_init(|| {
            info!(
                max_entries = config.max_entries,
                janitor_interval_secs = config.janitor_interval.as_secs_f64(),
                "Initializing cache"
            );
            let cache = MemoryCache::new(&config);
            cache.start_janitor(config.janitor_interval);
            (config.clone(), Arc::new(cache) as Arc<dyn CacheProvider>)
        });

        if *active != config {
            warn!(
                requested_max_entries = config.max_entries,
                active_max_entries = active.max_entries,
                "Cache already initialized, ignoring new configuration"
            );
        }

        Arc::clone(cache)
    }

    /// The initialized instance, if any
    pub fn get(&self) -> Option<Arc<dyn CacheProvider>> {
        self.instance.get().map(|(_, cache)| Arc::clone(cache))
    }
}

/// Process-wide cache factory
pub fn global() -> &'static CacheFactory {
    static FACTORY: CacheFactory = CacheFactory::new();
    &FACTORY
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_factory_first_config_wins() {
        let factory = CacheFactory::new();
        assert!(factory.get().is_none());

        let first = factory.get_or_init(CacheConfig {
            max_entries: 1,
            janitor_interval: Duration::from_secs(1),
        });
        let second = factory.get_or_init(CacheConfig {
            max_entries: 100,
            janitor_interval: Duration::from_secs(1),
        });
        assert!(Arc::ptr_eq(&first, &second));

        // Capacity of the first configuration is in force
        second.set("a", json!(1));
        second.set("b", json!(2));
        assert!(first.get("a").is_none());
        assert_eq!(first.get("b"), Some(json!(2)));
    }

    #[test]
    fn test_factory_get_returns_initialized_instance() {
        let factory = CacheFactory::new();
        let cache = factory.get_or_init(CacheConfig::default());
        cache.set("key", json!({"nested": true}));

        let fetched = factory.get().unwrap();
        assert_eq!(fetched.get("key"), Some(json!({"nested": true})));
    }

    #[test]
    fn test_memory_cache_provider_contract() {
        let cache = MemoryCache::new(&CacheConfig::default());
        assert!(cache.set("a", json!("x")));
        assert!(cache.set_with_ttl("b", json!("y"), Duration::ZERO));
        assert_eq!(cache.get("b"), Some(json!("y")));

        cache.delete("a");
        assert!(cache.get("a").is_none());

        cache.set("c", json!(3));
        cache.clear();
        assert!(cache.get("c").is_none());
    }

    #[tokio::test]
    async fn test_memory_cache_ttl() {
        let cache = MemoryCache::new(&CacheConfig::default());
        cache.set_with_ttl("short", json!(1), Duration::from_millis(50));
        assert_eq!(cache.get("short"), Some(json!(1)));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while cache.get("short").is_some() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(cache.get("short").is_none());
    }
}
