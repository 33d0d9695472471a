//! # Credential Providers
//!
//! Pluggable sources of trust material.
//!
//! A provider is built once per reconciliation cycle from the resource's
//! untyped configuration (see [`crate::registry`]) and asked for its
//! certificates exactly once.
//!
//! ## Built-in Providers
//!
//! - **inline**: PEM certificates embedded in the resource itself
//! - **azurekeyvault**: certificates read from Azure Key Vault

pub mod azure;
mod certificate;
mod error;
pub mod inline;

pub use certificate::{decode_certificates, Certificate};
pub use error::{ComponentType, ProviderError};

use crate::cache::CacheProvider;
use crate::registry::{Registry, RegistryError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Provider-specific metadata describing what was fetched
pub type ProviderStatus = serde_json::Map<String, serde_json::Value>;

/// Result of one fetch
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// Certificate chain in provider order
    pub certificates: Vec<Certificate>,
    /// `None` means the provider has no metadata to report
    pub status: Option<ProviderStatus>,
}

/// Key management system provider trait
///
/// Implementations must return [`ProviderError::Cancelled`] promptly once
/// `cancel` fires instead of completing a stale remote read.
#[async_trait]
pub trait KeyManagementSystemProvider: Send + Sync + std::fmt::Debug {
    async fn fetch_certificates(
        &self,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, ProviderError>;
}

/// Registry of key management system providers
pub type KmsRegistry = Registry<dyn KeyManagementSystemProvider>;

/// Build the key management system registry with every built-in provider
///
/// `inline` is the default when a resource carries no configuration. Remote
/// providers memoize access tokens in `cache`.
///
/// # Errors
///
/// Returns [`RegistryError::AlreadyRegistered`] if two built-ins share a name.
pub fn kms_registry(cache: Arc<dyn CacheProvider>) -> Result<KmsRegistry, RegistryError> {
    let mut registry = KmsRegistry::new("key management system").with_default(inline::PROVIDER_NAME);
    registry.register(inline::PROVIDER_NAME, Arc::new(inline::InlineProviderFactory))?;
    registry.register(azure::PROVIDER_NAME, Arc::new(azure::AzureKeyVaultFactory::new(cache)))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, MemoryCache};

    #[test]
    fn test_kms_registry_has_builtins() {
        let registry = kms_registry(Arc::new(MemoryCache::new(&CacheConfig::default()))).unwrap();
        assert_eq!(registry.registered_names(), vec!["azurekeyvault", "inline"]);
        assert_eq!(registry.default_name(), Some("inline"));
    }
}
