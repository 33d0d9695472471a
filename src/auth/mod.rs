//! # Auth Providers
//!
//! Registry credentials for hosts that serve signed artifacts.
//!
//! Auth providers are built through the same [`Registry`] as key management
//! system providers. A missing configuration selects `dockerConfig`.

mod anonymous;
mod docker_config;

pub use anonymous::{AnonymousAuthFactory, AnonymousAuthProvider};
pub use docker_config::{DockerConfigAuthFactory, DockerConfigAuthProvider};

use crate::cache::CacheProvider;
use crate::provider::ProviderError;
use crate::registry::{Registry, RegistryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Credentials are cached this long when the provider reports no expiry
pub const DEFAULT_AUTH_TTL: Duration = Duration::from_secs(300);

/// Credentials for one registry host
#[derive(Clone, Default, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub identity_token: String,
    /// `None` means the credentials do not expire
    #[serde(default)]
    #[zeroize(skip)]
    pub expires_on: Option<DateTime<Utc>>,
}

impl AuthConfig {
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty() && self.password.is_empty() && self.identity_token.is_empty()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("identity_token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Auth provider trait
#[async_trait]
pub trait AuthProvider: Send + Sync + fmt::Debug {
    /// Whether the provider is usable in this environment
    fn enabled(&self) -> bool;

    /// Credentials for `host`
    async fn provide(&self, host: &str) -> Result<AuthConfig, ProviderError>;
}

/// Registry of auth providers
pub type AuthRegistry = Registry<dyn AuthProvider>;

/// Build the auth provider registry with every built-in provider
///
/// # Errors
///
/// Returns [`RegistryError::AlreadyRegistered`] if two built-ins share a name.
pub fn auth_registry() -> Result<AuthRegistry, RegistryError> {
    let mut registry = AuthRegistry::new("auth provider").with_default(docker_config::PROVIDER_NAME);
    registry.register(docker_config::PROVIDER_NAME, Arc::new(DockerConfigAuthFactory))?;
    registry.register(anonymous::PROVIDER_NAME, Arc::new(AnonymousAuthFactory))?;
    Ok(registry)
}

fn cache_key(host: &str) -> String {
    format!("auth:{host}")
}

/// Credentials for `host`, memoized in `cache`
///
/// Entries live until the credentials expire, or [`DEFAULT_AUTH_TTL`] when
/// they carry no expiry. Already expired credentials are never cached.
///
/// # Errors
///
/// Propagates the provider's error on a cache miss.
pub async fn credentials_for(
    cache: &dyn CacheProvider,
    provider: &dyn AuthProvider,
    host: &str,
) -> Result<AuthConfig, ProviderError> {
    let key = cache_key(host);
    if let Some(value) = cache.get(&key) {
        match serde_json::from_value::<AuthConfig>(value) {
            Ok(credentials) => {
                debug!(host = host, "Using cached registry credentials");
                return Ok(credentials);
            }
            Err(e) => warn!(host = host, error = %e, "Discarding malformed cached credentials"),
        }
    }

    let credentials = provider.provide(host).await?;
    let ttl = match credentials.expires_on {
        Some(expires_on) => (expires_on - Utc::now()).to_std().unwrap_or_default(),
        None => DEFAULT_AUTH_TTL,
    };

    if ttl.is_zero() {
        debug!(host = host, "Credentials already expired, not caching");
        return Ok(credentials);
    }

    match serde_json::to_value(&credentials) {
        Ok(value) => {
            cache.set_with_ttl(&key, value, ttl);
        }
        Err(e) => warn!(host = host, error = %e, "Failed to cache registry credentials"),
    }

    Ok(credentials)
}
