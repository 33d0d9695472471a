//! # Azure Key Vault Provider
//!
//! Fetches certificates from Azure Key Vault.
//!
//! ```yaml
//! spec:
//!   type: azurekeyvault
//!   parameters:
//!     vaultURI: https://signing.vault.azure.net/
//!     tenantID: 00000000-0000-0000-0000-000000000000
//!     clientID: 11111111-1111-1111-1111-111111111111
//!     certificates:
//!       - name: signer
//!         version: 0123abcd
//!       - name: intermediate
//! ```
//!
//! Construction only validates and stores the parameters. Every fetch reads
//! the configured certificates and reports the version that was retrieved.

pub mod auth;
pub mod client;

pub use auth::{AccessToken, StaticTokenCredential, TokenCredential, WorkloadIdentityCredential};

use crate::cache::CacheProvider;
use crate::observability::metrics;
use crate::provider::{
    Certificate, ComponentType, FetchResult, KeyManagementSystemProvider, ProviderError,
    ProviderStatus,
};
use crate::registry::{ProviderConfig, ProviderFactory};
use async_trait::async_trait;
use base64::prelude::*;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

/// Registration name of the Azure Key Vault provider
pub const PROVIDER_NAME: &str = "azurekeyvault";

/// Typed view of the Azure Key Vault provider parameters
#[derive(Debug, Clone, Deserialize)]
pub struct AzureKeyVaultConfig {
    #[serde(rename = "vaultURI", default)]
    pub vault_uri: String,
    #[serde(rename = "tenantID", default)]
    pub tenant_id: String,
    #[serde(rename = "clientID", default)]
    pub client_id: String,
    #[serde(default)]
    pub certificates: Vec<KeyVaultCertificate>,
}

/// A certificate to read; without a version the latest one is used
#[derive(Debug, Clone, Deserialize)]
pub struct KeyVaultCertificate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl AzureKeyVaultConfig {
    /// Parse and validate untyped provider configuration
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ConfigInvalid`] when a required field is missing
    /// or the vault URI is not an http(s) URL.
    pub fn from_provider_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let parsed: Self = serde_json::from_value(Value::Object(config.clone())).map_err(|e| {
            ProviderError::config_invalid(
                ComponentType::KeyManagementSystemProvider,
                format!("failed to parse config: {e}"),
            )
        })?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), ProviderError> {
        let invalid = |detail: String| {
            ProviderError::config_invalid(ComponentType::KeyManagementSystemProvider, detail)
        };

        if self.vault_uri.is_empty() {
            return Err(invalid("vaultURI is not set".to_string()));
        }
        let url = reqwest::Url::parse(&self.vault_uri)
            .map_err(|e| invalid(format!("vaultURI {} is invalid: {e}", self.vault_uri)))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(invalid(format!("vaultURI {} must be an http(s) URL", self.vault_uri)));
        }
        if self.tenant_id.is_empty() {
            return Err(invalid("tenantID is not set".to_string()));
        }
        if self.client_id.is_empty() {
            return Err(invalid("clientID is not set".to_string()));
        }
        if self.certificates.is_empty() {
            return Err(invalid("no certificates configured".to_string()));
        }
        if self.certificates.iter().any(|certificate| certificate.name.is_empty()) {
            return Err(invalid("certificate name cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Azure Key Vault provider implementation
pub struct AzureKeyVaultProvider {
    config: AzureKeyVaultConfig,
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
}

impl fmt::Debug for AzureKeyVaultProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureKeyVaultProvider")
            .field("vault_uri", &self.config.vault_uri)
            .field("certificates", &self.config.certificates.len())
            .finish_non_exhaustive()
    }
}

impl AzureKeyVaultProvider {
    /// Create a provider authenticating with Azure Workload Identity
    ///
    /// Access tokens are memoized in `tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ConfigInvalid`] for invalid parameters.
    pub fn from_config(
        config: &ProviderConfig,
        tokens: Arc<dyn CacheProvider>,
    ) -> Result<Self, ProviderError> {
        let config = AzureKeyVaultConfig::from_provider_config(config)?;
        let credential = WorkloadIdentityCredential::from_env(
            config.tenant_id.clone(),
            config.client_id.clone(),
            tokens,
        );
        info!(
            vault_uri = %config.vault_uri,
            client_id = %config.client_id,
            "Using Azure Workload Identity authentication"
        );
        Self::with_credential(config, Arc::new(credential))
    }

    /// Create a provider with an explicit credential
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ConfigInvalid`] for invalid parameters or if
    /// the HTTP client cannot be built.
    pub fn with_credential(
        config: AzureKeyVaultConfig,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, ProviderError> {
        config.validate()?;
        let http = reqwest::Client::builder().build().map_err(|e| {
            ProviderError::config_invalid(
                ComponentType::KeyManagementSystemProvider,
                format!("failed to create HTTP client: {e}"),
            )
        })?;

        Ok(Self {
            config,
            http,
            credential,
        })
    }

    async fn fetch_all(&self, cancel: &CancellationToken) -> Result<FetchResult, ProviderError> {
        let token = until_cancelled(cancel, self.credential.get_token(&self.http)).await?;

        let mut certificates = Vec::with_capacity(self.config.certificates.len());
        let mut fetched = Vec::with_capacity(self.config.certificates.len());
        for entry in &self.config.certificates {
            let (certificate, properties) = self.fetch_one(&token, entry, cancel).await?;
            certificates.push(certificate);
            fetched.push(properties);
        }

        let mut status = ProviderStatus::new();
        status.insert("certificates".to_string(), Value::Array(fetched));
        Ok(FetchResult {
            certificates,
            status: Some(status),
        })
    }

    async fn fetch_one(
        &self,
        token: &AccessToken,
        entry: &KeyVaultCertificate,
        cancel: &CancellationToken,
    ) -> Result<(Certificate, Value), ProviderError> {
        let start = Instant::now();
        let bundle = until_cancelled(
            cancel,
            client::get_certificate(
                &self.http,
                &self.config.vault_uri,
                token,
                &entry.name,
                entry.version.as_deref(),
            ),
        )
        .await?;
        metrics::record_provider_operation(
            PROVIDER_NAME,
            "get_certificate",
            start.elapsed().as_secs_f64(),
        );

        if !bundle.is_enabled() {
            return Err(ProviderError::fetch(
                ComponentType::KeyManagementSystemProvider,
                format!("certificate {} is disabled", entry.name),
            ));
        }

        let der = BASE64_STANDARD.decode(bundle.cer.as_bytes()).map_err(|e| {
            ProviderError::cert_invalid(
                ComponentType::CertProvider,
                format!("failed to decode certificate {}: {e}", entry.name),
            )
        })?;
        let certificate = Certificate::from_der(der)?;

        debug!(
            certificate = %entry.name,
            version = bundle.version(),
            subject = certificate.subject(),
            "Fetched certificate from Key Vault"
        );

        let properties = json!({
            "name": entry.name,
            "version": bundle.version(),
            "lastRefreshed": Utc::now().to_rfc3339(),
        });
        Ok((certificate, properties))
    }
}

#[async_trait]
impl KeyManagementSystemProvider for AzureKeyVaultProvider {
    async fn fetch_certificates(
        &self,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, ProviderError> {
        let span = info_span!(
            "azure.keyvault.certificates.fetch",
            vault.uri = %self.config.vault_uri,
            certificate.count = self.config.certificates.len()
        );

        async move {
            let result = self.fetch_all(cancel).await;
            match &result {
                Ok(fetched) => info!(
                    count = fetched.certificates.len(),
                    "Fetched certificates from Azure Key Vault"
                ),
                Err(ProviderError::Cancelled { .. }) => {}
                Err(_) => metrics::increment_provider_operation_errors(PROVIDER_NAME),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Race `operation` against cancellation of the cycle
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ProviderError::Cancelled {
            component: ComponentType::KeyManagementSystemProvider,
        }),
        result = operation => result,
    }
}

/// Factory registered as `azurekeyvault`
///
/// Providers built by one factory share its token cache.
#[derive(Debug)]
pub struct AzureKeyVaultFactory {
    tokens: Arc<dyn CacheProvider>,
}

impl AzureKeyVaultFactory {
    pub fn new(tokens: Arc<dyn CacheProvider>) -> Self {
        Self { tokens }
    }
}

impl ProviderFactory<dyn KeyManagementSystemProvider> for AzureKeyVaultFactory {
    fn create(
        &self,
        _version: &str,
        config: &ProviderConfig,
        _plugin_directory: &Path,
    ) -> Result<Box<dyn KeyManagementSystemProvider>, ProviderError> {
        Ok(Box::new(AzureKeyVaultProvider::from_config(
            config,
            Arc::clone(&self.tokens),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(value: Value) -> ProviderConfig {
        value.as_object().cloned().unwrap()
    }

    fn valid() -> Value {
        json!({
            "type": "azurekeyvault",
            "vaultURI": "https://signing.vault.azure.net/",
            "tenantID": "tenant",
            "clientID": "client",
            "certificates": [{"name": "signer", "version": "v1"}, {"name": "intermediate"}]
        })
    }

    #[test]
    fn test_valid_config() {
        let parsed = AzureKeyVaultConfig::from_provider_config(&config(valid())).unwrap();
        assert_eq!(parsed.vault_uri, "https://signing.vault.azure.net/");
        assert_eq!(parsed.certificates.len(), 2);
        assert_eq!(parsed.certificates[0].version.as_deref(), Some("v1"));
        assert!(parsed.certificates[1].version.is_none());
    }

    #[test]
    fn test_missing_fields() {
        for (field, message) in [
            ("vaultURI", "vaultURI is not set"),
            ("tenantID", "tenantID is not set"),
            ("clientID", "clientID is not set"),
            ("certificates", "no certificates configured"),
        ] {
            let mut value = valid();
            value.as_object_mut().unwrap().remove(field);
            let err = AzureKeyVaultConfig::from_provider_config(&config(value)).unwrap_err();
            assert!(err.to_string().contains(message), "{field}: {err}");
        }
    }

    #[test]
    fn test_invalid_vault_uri() {
        let mut value = valid();
        value["vaultURI"] = json!("ftp://signing.vault.azure.net/");
        let err = AzureKeyVaultConfig::from_provider_config(&config(value)).unwrap_err();
        assert!(err.to_string().contains("must be an http(s) URL"));
    }

    #[test]
    fn test_empty_certificate_name() {
        let mut value = valid();
        value["certificates"] = json!([{"name": ""}]);
        let err = AzureKeyVaultConfig::from_provider_config(&config(value)).unwrap_err();
        assert!(err.to_string().contains("certificate name cannot be empty"));
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let parsed = AzureKeyVaultConfig::from_provider_config(&config(valid())).unwrap();
        let provider =
            AzureKeyVaultProvider::with_credential(parsed, Arc::new(StaticTokenCredential::new("t")))
                .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = provider.fetch_certificates(&cancel).await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled { .. }));
    }
}
