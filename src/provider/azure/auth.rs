//! # Azure Key Vault Authentication
//!
//! Bearer tokens for Key Vault via Azure Workload Identity federation.
//!
//! The pod's projected service account token (`AZURE_FEDERATED_TOKEN_FILE`) is
//! exchanged for an Entra ID access token with the client credentials grant.
//! Tokens are memoized in the process-wide cache, keyed by tenant and client,
//! until shortly before they expire. Every provider built for the same
//! identity shares them across reconciliation cycles.

use crate::cache::CacheProvider;
use crate::observability::metrics;
use crate::provider::{ComponentType, ProviderError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Path of the projected service account token
pub const AZURE_FEDERATED_TOKEN_FILE: &str = "AZURE_FEDERATED_TOKEN_FILE";
/// Entra ID authority, injected by the workload identity webhook
pub const AZURE_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com/";
const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";
const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Tokens are refreshed this long before they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Bearer token for the Key Vault data plane
#[derive(Clone)]
pub struct AccessToken {
    secret: Zeroizing<String>,
    expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            expires_on,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    fn to_cache_value(&self) -> Value {
        json!({
            "secret": self.secret.as_str(),
            "expiresOn": self.expires_on.to_rfc3339(),
        })
    }

    fn from_cache_value(value: &Value) -> Option<Self> {
        let secret = value.get("secret")?.as_str()?;
        let expires_on = DateTime::parse_from_rfc3339(value.get("expiresOn")?.as_str()?).ok()?;
        Some(Self::new(secret, expires_on.with_timezone(&Utc)))
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Source of Key Vault bearer tokens
#[async_trait]
pub trait TokenCredential: Send + Sync + fmt::Debug {
    async fn get_token(&self, http: &reqwest::Client) -> Result<AccessToken, ProviderError>;
}

/// Credential returning a fixed token
///
/// Used with pre-issued tokens and against local mock vaults.
#[derive(Debug, Clone)]
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    /// Token valid for one hour from now
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(secret, Utc::now() + chrono::Duration::hours(1)),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _http: &reqwest::Client) -> Result<AccessToken, ProviderError> {
        Ok(self.token.clone())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Azure Workload Identity credential
pub struct WorkloadIdentityCredential {
    tenant_id: String,
    client_id: String,
    authority_host: String,
    token_file: Option<PathBuf>,
    tokens: Arc<dyn CacheProvider>,
}

impl fmt::Debug for WorkloadIdentityCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadIdentityCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("authority_host", &self.authority_host)
            .field("token_file", &self.token_file)
            .finish_non_exhaustive()
    }
}

impl WorkloadIdentityCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        authority_host: impl Into<String>,
        token_file: Option<PathBuf>,
        tokens: Arc<dyn CacheProvider>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            authority_host: authority_host.into(),
            token_file,
            tokens,
        }
    }

    /// Read the authority host and token file injected by the workload identity webhook
    ///
    /// A missing token file is reported at fetch time, not here.
    pub fn from_env(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        tokens: Arc<dyn CacheProvider>,
    ) -> Self {
        let authority_host = std::env::var(AZURE_AUTHORITY_HOST)
            .ok()
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());
        let token_file = std::env::var_os(AZURE_FEDERATED_TOKEN_FILE).map(PathBuf::from);
        Self::new(tenant_id, client_id, authority_host, token_file, tokens)
    }

    fn cache_key(&self) -> String {
        format!("azure-token:{}/{}", self.tenant_id, self.client_id)
    }

    async fn request_token(&self, http: &reqwest::Client) -> Result<AccessToken, ProviderError> {
        let component = ComponentType::KeyManagementSystemProvider;
        let token_file = self.token_file.as_ref().ok_or_else(|| {
            ProviderError::fetch(
                component,
                format!("{AZURE_FEDERATED_TOKEN_FILE} is not set, workload identity is not configured"),
            )
        })?;

        let assertion = Zeroizing::new(tokio::fs::read_to_string(token_file).await.map_err(|e| {
            ProviderError::fetch(
                component,
                format!("failed to read federated token file {}: {e}", token_file.display()),
            )
        })?);

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        );
        let form = [
            ("client_id", self.client_id.as_str()),
            ("scope", KEY_VAULT_SCOPE),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion.trim()),
            ("grant_type", "client_credentials"),
        ];

        let start = Instant::now();
        let response = http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::fetch(component, format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            metrics::increment_provider_operation_errors(super::PROVIDER_NAME);
            return Err(ProviderError::fetch(
                component,
                format!("token request failed with status {status}: {body}"),
            ));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            ProviderError::fetch(component, format!("failed to decode token response: {e}"))
        })?;
        metrics::record_provider_operation(
            super::PROVIDER_NAME,
            "get_token",
            start.elapsed().as_secs_f64(),
        );

        let lifetime = Duration::from_secs(token.expires_in);
        let expires_on = Utc::now()
            + chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::zero());
        Ok(AccessToken::new(token.access_token, expires_on))
    }
}

#[async_trait]
impl TokenCredential for WorkloadIdentityCredential {
    async fn get_token(&self, http: &reqwest::Client) -> Result<AccessToken, ProviderError> {
        let key = self.cache_key();
        if let Some(token) = self
            .tokens
            .get(&key)
            .as_ref()
            .and_then(AccessToken::from_cache_value)
        {
            debug!(client_id = %self.client_id, "Using cached Key Vault token");
            return Ok(token);
        }

        let token = self.request_token(http).await?;
        let remaining = (token.expires_on() - Utc::now())
            .to_std()
            .unwrap_or_default()
            .saturating_sub(TOKEN_REFRESH_MARGIN);
        if remaining.is_zero() {
            debug!("Key Vault token expires within the refresh margin, not caching");
        } else if self.tokens.set_with_ttl(&key, token.to_cache_value(), remaining) {
            debug!(ttl_secs = remaining.as_secs(), "Cached Key Vault token");
        }

        info!(client_id = %self.client_id, "Acquired Key Vault token via workload identity");
        Ok(token)
    }
}
