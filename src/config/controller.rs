//! # Reconciler Configuration
//!
//! Provider construction and cache settings loaded from environment variables.

use super::env_var_or_default;
use crate::cache::CacheConfig;
use crate::constants::{
    DEFAULT_CACHE_JANITOR_INTERVAL_SECS, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CONFIG_VERSION,
    DEFAULT_PLUGIN_DIRECTORY,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Version passed to every provider factory
    pub config_version: String,
    /// Directory passed to every provider factory
    pub plugin_directory: PathBuf,
    /// Capacity of the process-wide cache (0 = unbounded)
    pub cache_max_entries: usize,
    /// Interval of the cache eviction task (seconds)
    pub cache_janitor_interval_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            config_version: DEFAULT_CONFIG_VERSION.to_string(),
            plugin_directory: PathBuf::from(DEFAULT_PLUGIN_DIRECTORY),
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            cache_janitor_interval_secs: DEFAULT_CACHE_JANITOR_INTERVAL_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            config_version: env_var_or_default("CONFIG_VERSION", DEFAULT_CONFIG_VERSION.to_string()),
            plugin_directory: env_var_or_default(
                "PLUGIN_DIRECTORY",
                PathBuf::from(DEFAULT_PLUGIN_DIRECTORY),
            ),
            cache_max_entries: env_var_or_default("CACHE_MAX_ENTRIES", DEFAULT_CACHE_MAX_ENTRIES),
            cache_janitor_interval_secs: env_var_or_default(
                "CACHE_JANITOR_INTERVAL_SECS",
                DEFAULT_CACHE_JANITOR_INTERVAL_SECS,
            ),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.cache_max_entries,
            janitor_interval: Duration::from_secs(self.cache_janitor_interval_secs),
        }
    }
}
