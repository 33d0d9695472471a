//! # Provider Registry
//!
//! Name-indexed construction of providers from untyped configuration.
//!
//! The same [`Registry`] backs both the key management system providers and the
//! auth providers. A registry is built once at startup and then shared read-only,
//! so registration takes `&mut self` and lookups need no locking.
//!
//! ## Resolution
//!
//! 1. `None` config resolves to the registry's default factory (if one is designated)
//! 2. Otherwise `config["type"]` must be a non-empty string naming a registered factory
//! 3. The factory receives the version, the full config and the plugin directory

use crate::provider::ProviderError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Key of the factory discriminator in every provider config
pub const TYPE_KEY: &str = "type";

/// Untyped provider configuration
///
/// Always carries a `type` key once it reaches a factory.
pub type ProviderConfig = serde_json::Map<String, Value>;

/// Factory contract shared by every registry
///
/// `config` always carries a `type` key matching the factory's registration name.
pub trait ProviderFactory<P: ?Sized>: Send + Sync {
    /// Build a provider instance
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the configuration is invalid for this provider.
    fn create(
        &self,
        version: &str,
        config: &ProviderConfig,
        plugin_directory: &Path,
    ) -> Result<Box<P>, ProviderError>;
}

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} factory named {name} already registered")]
    AlreadyRegistered { kind: &'static str, name: String },
    #[error("failed to find {kind} name in the config with key type")]
    MissingType { kind: &'static str },
    #[error("{kind} type must be a string, got {value}")]
    InvalidType { kind: &'static str, value: Value },
    #[error("{kind} type cannot be empty")]
    EmptyType { kind: &'static str },
    #[error("{kind} factory with name {name} not found")]
    NotFound { kind: &'static str, name: String },
    #[error("no {kind} config provided and no default {kind} is designated")]
    NoDefault { kind: &'static str },
    #[error("failed to create {kind} {name}: {source}")]
    Create {
        kind: &'static str,
        name: String,
        #[source]
        source: ProviderError,
    },
}

/// Named provider factories of one kind
pub struct Registry<P: ?Sized> {
    kind: &'static str,
    default_name: Option<&'static str>,
    factories: BTreeMap<String, Arc<dyn ProviderFactory<P>>>,
}

impl<P: ?Sized> fmt::Debug for Registry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("default_name", &self.default_name)
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<P: ?Sized> Registry<P> {
    /// Create an empty registry
    ///
    /// `kind` is used in error messages and logs (e.g. "key management system").
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            default_name: None,
            factories: BTreeMap::new(),
        }
    }

    /// Designate the factory used when no config is supplied
    #[must_use]
    pub fn with_default(mut self, name: &'static str) -> Self {
        self.default_name = Some(name);
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn default_name(&self) -> Option<&'static str> {
        self.default_name
    }

    /// Register a factory by name
    ///
    /// The first registration wins; a second registration under the same name
    /// is rejected so behavior never depends on initialization order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] if `name` is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn ProviderFactory<P>>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered {
                kind: self.kind,
                name,
            });
        }

        debug!(kind = self.kind, factory = %name, "Registered provider factory");
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered factory names in sorted order
    pub fn registered_names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Create a provider from configuration
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] when the type discriminator is missing, empty or
    /// unregistered, or when the factory rejects the configuration.
    pub fn create_from_config(
        &self,
        config: Option<&ProviderConfig>,
        version: &str,
        plugin_directory: &Path,
    ) -> Result<Box<P>, RegistryError> {
        let Some(config) = config else {
            let name = self
                .default_name
                .ok_or(RegistryError::NoDefault { kind: self.kind })?;
            info!(kind = self.kind, provider = name, "Selected default provider");

            let mut default_config = ProviderConfig::new();
            default_config.insert(TYPE_KEY.to_string(), Value::String(name.to_string()));
            return self.create_named(name, &default_config, version, plugin_directory);
        };

        let name = match config.get(TYPE_KEY) {
            None => return Err(RegistryError::MissingType { kind: self.kind }),
            Some(Value::String(name)) => name.as_str(),
            Some(other) => {
                return Err(RegistryError::InvalidType {
                    kind: self.kind,
                    value: other.clone(),
                })
            }
        };

        if name.is_empty() {
            return Err(RegistryError::EmptyType { kind: self.kind });
        }

        self.create_named(name, config, version, plugin_directory)
    }

    fn create_named(
        &self,
        name: &str,
        config: &ProviderConfig,
        version: &str,
        plugin_directory: &Path,
    ) -> Result<Box<P>, RegistryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::NotFound {
                kind: self.kind,
                name: name.to_string(),
            })?;

        factory
            .create(version, config, plugin_directory)
            .map_err(|source| RegistryError::Create {
                kind: self.kind,
                name: name.to_string(),
                source,
            })
    }
}
