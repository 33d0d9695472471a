//! # Key Vault REST Client
//!
//! Minimal client for the Key Vault certificates data plane.

use super::auth::AccessToken;
use crate::provider::{ComponentType, ProviderError};
use serde::Deserialize;

/// Key Vault data plane API version
pub const API_VERSION: &str = "7.4";

/// Certificate bundle returned by `GET /certificates/{name}/{version}`
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateBundle {
    /// Full certificate identifier, ending in the version
    pub id: String,
    /// Base64 encoded DER certificate
    pub cer: String,
    #[serde(default)]
    pub attributes: Option<CertificateAttributes>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertificateAttributes {
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl CertificateBundle {
    /// Version segment of the certificate identifier
    pub fn version(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or_default()
    }

    pub fn is_enabled(&self) -> bool {
        self.attributes
            .as_ref()
            .and_then(|attributes| attributes.enabled)
            .unwrap_or(true)
    }
}

/// URL of a certificate; an absent version selects the latest one
pub fn certificate_url(vault_uri: &str, name: &str, version: Option<&str>) -> String {
    format!(
        "{}/certificates/{}/{}?api-version={API_VERSION}",
        vault_uri.trim_end_matches('/'),
        name,
        version.unwrap_or_default()
    )
}

/// Read one certificate bundle
pub async fn get_certificate(
    http: &reqwest::Client,
    vault_uri: &str,
    token: &AccessToken,
    name: &str,
    version: Option<&str>,
) -> Result<CertificateBundle, ProviderError> {
    let component = ComponentType::KeyManagementSystemProvider;
    let url = certificate_url(vault_uri, name, version);

    let response = http
        .get(&url)
        .bearer_auth(token.secret())
        .send()
        .await
        .map_err(|e| ProviderError::fetch(component, format!("failed to get certificate {name}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::fetch(
            component,
            format!("failed to get certificate {name}: status {status}: {body}"),
        ));
    }

    response.json::<CertificateBundle>().await.map_err(|e| {
        ProviderError::fetch(
            component,
            format!("failed to decode certificate bundle {name}: {e}"),
        )
    })
}
