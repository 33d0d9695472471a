//! # Inline Provider
//!
//! Serves PEM certificates embedded directly in the resource parameters.
//!
//! ```yaml
//! parameters:
//!   contentType: certificate
//!   value: |
//!     -----BEGIN CERTIFICATE-----
//!     ...
//! ```
//!
//! All decoding happens at construction, so a fetch cannot fail.

use super::{
    decode_certificates, Certificate, ComponentType, FetchResult, KeyManagementSystemProvider,
    ProviderError,
};
use crate::registry::{ProviderConfig, ProviderFactory};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Registration name of the inline provider
pub const PROVIDER_NAME: &str = "inline";

/// The only supported content type
pub const CONTENT_TYPE_CERTIFICATE: &str = "certificate";

/// Typed view of the inline provider parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineConfig {
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    value: String,
}

/// Provider holding a pre-parsed certificate chain
#[derive(Debug, Clone)]
pub struct InlineProvider {
    content_type: String,
    certificates: Vec<Certificate>,
}

impl InlineProvider {
    /// Parse the configuration and decode every certificate
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ConfigInvalid`] for a missing or unsupported
    /// content type or an empty value, and [`ProviderError::CertInvalid`] when
    /// the PEM content does not decode.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let component = ComponentType::KeyManagementSystemProvider;
        let parsed: InlineConfig = serde_json::from_value(serde_json::Value::Object(config.clone()))
            .map_err(|e| ProviderError::config_invalid(component, format!("failed to parse config: {e}")))?;

        if parsed.content_type.is_empty() {
            return Err(ProviderError::config_invalid(
                component,
                "contentType parameter is not set",
            ));
        }
        if parsed.content_type != CONTENT_TYPE_CERTIFICATE {
            return Err(ProviderError::config_invalid(
                component,
                format!("content type {} is not supported", parsed.content_type),
            ));
        }
        if parsed.value.is_empty() {
            return Err(ProviderError::config_invalid(component, "value parameter is not set"));
        }

        let certificates = decode_certificates(parsed.value.as_bytes())?;
        debug!(count = certificates.len(), "Decoded inline certificates");

        Ok(Self {
            content_type: parsed.content_type,
            certificates,
        })
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

#[async_trait]
impl KeyManagementSystemProvider for InlineProvider {
    async fn fetch_certificates(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<FetchResult, ProviderError> {
        Ok(FetchResult {
            certificates: self.certificates.clone(),
            status: None,
        })
    }
}

/// Factory registered as `inline`
#[derive(Debug, Default)]
pub struct InlineProviderFactory;

impl ProviderFactory<dyn KeyManagementSystemProvider> for InlineProviderFactory {
    fn create(
        &self,
        _version: &str,
        config: &ProviderConfig,
        _plugin_directory: &Path,
    ) -> Result<Box<dyn KeyManagementSystemProvider>, ProviderError> {
        Ok(Box::new(InlineProvider::from_config(config)?))
    }
}
