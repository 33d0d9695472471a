//! Anonymous access: empty credentials for every host.

use super::{AuthConfig, AuthProvider};
use crate::provider::ProviderError;
use crate::registry::{ProviderConfig, ProviderFactory};
use async_trait::async_trait;
use std::path::Path;

/// Registration name of the anonymous provider
pub const PROVIDER_NAME: &str = "anonymous";

#[derive(Debug, Default)]
pub struct AnonymousAuthProvider;

#[async_trait]
impl AuthProvider for AnonymousAuthProvider {
    fn enabled(&self) -> bool {
        true
    }

    async fn provide(&self, _host: &str) -> Result<AuthConfig, ProviderError> {
        Ok(AuthConfig::default())
    }
}

#[derive(Debug, Default)]
pub struct AnonymousAuthFactory;

impl ProviderFactory<dyn AuthProvider> for AnonymousAuthFactory {
    fn create(
        &self,
        _version: &str,
        _config: &ProviderConfig,
        _plugin_directory: &Path,
    ) -> Result<Box<dyn AuthProvider>, ProviderError> {
        Ok(Box::new(AnonymousAuthProvider))
    }
}
