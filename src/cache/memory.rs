//! In-memory [`CacheProvider`] backed by [`TtlCache`].

use super::{CacheConfig, CacheProvider, TtlCache};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MemoryCache {
    entries: Arc<TtlCache<String, Value>>,
}

impl MemoryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Arc::new(TtlCache::new(config.max_entries)),
        }
    }

    /// Start background eviction if a tokio runtime is available
    pub fn start_janitor(&self, interval: Duration) {
        if tokio::runtime::Handle::try_current().is_ok() {
            drop(self.entries.spawn_janitor(interval));
        } else {
            debug!("No async runtime, expired cache entries are removed on access only");
        }
    }
}

impl CacheProvider for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(&key.to_string())
    }

    fn set(&self, key: &str, value: Value) -> bool {
        self.entries.set(key.to_string(), value)
    }

    fn set_with_ttl(&self, key: &str, value: Value, ttl: Duration) -> bool {
        self.entries.set_with_ttl(key.to_string(), value, ttl)
    }

    fn delete(&self, key: &str) {
        self.entries.delete(&key.to_string());
    }

    fn clear(&self) {
        self.entries.clear();
    }
}
