//! # Provider Error Types
//!
//! Error taxonomy shared by credential and auth providers. Every error carries
//! the component that raised it so status messages identify the failing stage.

use std::fmt;
use thiserror::Error;

/// Component that raised a provider error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    /// A key management system provider (construction or fetch)
    KeyManagementSystemProvider,
    /// Certificate decoding and parsing
    CertProvider,
    /// An auth provider
    AuthProvider,
}

impl ComponentType {
    /// Get human-readable component string for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::KeyManagementSystemProvider => "keyManagementSystemProvider",
            ComponentType::CertProvider => "certProvider",
            ComponentType::AuthProvider => "authProvider",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider error with classification
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Configuration is missing or invalid (terminal for the cycle)
    #[error("CONFIG_INVALID: {component}: {detail}")]
    ConfigInvalid {
        component: ComponentType,
        detail: String,
    },
    /// PEM or X.509 content could not be decoded (terminal for the cycle)
    #[error("CERT_INVALID: {component}: {detail}")]
    CertInvalid {
        component: ComponentType,
        detail: String,
    },
    /// A remote read failed (retried on the next change notification)
    #[error("FETCH_FAILED: {component}: {detail}")]
    Fetch {
        component: ComponentType,
        detail: String,
    },
    /// The cycle was cancelled while the provider was working
    #[error("CANCELLED: {component}: operation cancelled")]
    Cancelled { component: ComponentType },
}

impl ProviderError {
    pub fn config_invalid(component: ComponentType, detail: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            component,
            detail: detail.into(),
        }
    }

    pub fn cert_invalid(component: ComponentType, detail: impl Into<String>) -> Self {
        Self::CertInvalid {
            component,
            detail: detail.into(),
        }
    }

    pub fn fetch(component: ComponentType, detail: impl Into<String>) -> Self {
        Self::Fetch {
            component,
            detail: detail.into(),
        }
    }

    pub fn component(&self) -> ComponentType {
        match self {
            ProviderError::ConfigInvalid { component, .. }
            | ProviderError::CertInvalid { component, .. }
            | ProviderError::Fetch { component, .. }
            | ProviderError::Cancelled { component } => *component,
        }
    }

    /// Whether the next change notification may succeed without a config change
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Fetch { .. } | ProviderError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_component() {
        let err = ProviderError::config_invalid(
            ComponentType::KeyManagementSystemProvider,
            "contentType parameter is not set",
        );
        assert_eq!(
            err.to_string(),
            "CONFIG_INVALID: keyManagementSystemProvider: contentType parameter is not set"
        );
        assert_eq!(err.component(), ComponentType::KeyManagementSystemProvider);
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::fetch(ComponentType::KeyManagementSystemProvider, "503").is_transient());
        assert!(!ProviderError::cert_invalid(ComponentType::CertProvider, "bad pem").is_transient());
    }
}
