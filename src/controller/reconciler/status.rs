//! # Status Management
//!
//! Builds and persists the `KeyManagementSystem` status after each cycle.
//!
//! `lastFetchedTime` is stamped on every attempt. `properties` is only ever
//! replaced by fresh provider metadata; failures and metadata-free successes
//! keep whatever was persisted before.

use crate::constants::MAX_BRIEF_ERROR_LENGTH;
use crate::controller::orchestrator::Orchestrator;
use crate::crd::{KeyManagementSystemStatus, ResourceKey};
use crate::provider::ProviderStatus;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Truncate an error for compact display
///
/// Errors longer than the bound keep their first characters plus `...`.
pub fn brief_error(error: &str) -> String {
    if error.chars().count() > MAX_BRIEF_ERROR_LENGTH {
        let prefix: String = error.chars().take(MAX_BRIEF_ERROR_LENGTH).collect();
        format!("{prefix}...")
    } else {
        error.to_string()
    }
}

/// Status after a failed cycle
pub fn update_error_status(
    current: Option<&KeyManagementSystemStatus>,
    error: &str,
    operation_time: &str,
) -> KeyManagementSystemStatus {
    KeyManagementSystemStatus {
        is_success: false,
        error: error.to_string(),
        brief_error: brief_error(error),
        last_fetched_time: Some(operation_time.to_string()),
        properties: current.and_then(|status| status.properties.clone()),
    }
}

/// Status after a successful cycle
///
/// `provider_status` of `None` leaves the previous `properties` in place.
pub fn update_success_status(
    current: Option<&KeyManagementSystemStatus>,
    operation_time: &str,
    provider_status: Option<ProviderStatus>,
) -> KeyManagementSystemStatus {
    let properties = match provider_status {
        Some(provider_status) => Some(serde_json::Value::Object(provider_status)),
        None => current.and_then(|status| status.properties.clone()),
    };

    KeyManagementSystemStatus {
        is_success: true,
        error: String::new(),
        brief_error: String::new(),
        last_fetched_time: Some(operation_time.to_string()),
        properties,
    }
}

/// Persist a status
///
/// Failures are logged and never escalated into the resource's own status.
/// Nothing is written once the cycle has been cancelled.
pub async fn write_status(
    orchestrator: &dyn Orchestrator,
    key: &ResourceKey,
    status: &KeyManagementSystemStatus,
    cancel: &CancellationToken,
) {
    if cancel.is_cancelled() {
        debug!(resource = %key, "Cycle cancelled, skipping status write");
        return;
    }

    if let Err(e) = orchestrator.update_status(key, status).await {
        error!(resource = %key, error = %e, "Unable to update key management system status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: &str = "2024-01-01T00:00:00+00:00";

    fn with_properties() -> KeyManagementSystemStatus {
        KeyManagementSystemStatus {
            is_success: true,
            properties: Some(json!({"certificates": [{"name": "signer", "version": "v1"}]})),
            ..Default::default()
        }
    }

    #[test]
    fn test_brief_error_short() {
        assert_eq!(brief_error("short error"), "short error");
        let exactly = "a".repeat(30);
        assert_eq!(brief_error(&exactly), exactly);
    }

    #[test]
    fn test_brief_error_truncates() {
        let long = "certificate store already exists: key management system and certificate store cannot be configured together";
        let brief = brief_error(long);
        assert_eq!(brief, format!("{}...", &long[..30]));
        assert_eq!(brief, "certificate store already exis...");
    }

    #[test]
    fn test_brief_error_counts_characters() {
        let long = "é".repeat(31);
        assert_eq!(brief_error(&long), format!("{}...", "é".repeat(30)));
    }

    #[test]
    fn test_error_status_keeps_properties() {
        let current = with_properties();
        let status = update_error_status(Some(&current), "boom", NOW);

        assert!(!status.is_success);
        assert_eq!(status.error, "boom");
        assert_eq!(status.brief_error, "boom");
        assert_eq!(status.last_fetched_time.as_deref(), Some(NOW));
        assert_eq!(status.properties, current.properties);
    }

    #[test]
    fn test_success_without_metadata_keeps_properties() {
        let current = KeyManagementSystemStatus {
            is_success: false,
            error: "old".to_string(),
            brief_error: "old".to_string(),
            ..with_properties()
        };
        let status = update_success_status(Some(&current), NOW, None);

        assert!(status.is_success);
        assert!(status.error.is_empty());
        assert!(status.brief_error.is_empty());
        assert_eq!(status.properties, current.properties);
    }

    #[test]
    fn test_success_with_metadata_overwrites_properties() {
        let current = with_properties();
        let mut provider_status = ProviderStatus::new();
        provider_status.insert("certificates".to_string(), json!([{"name": "signer", "version": "v2"}]));

        let status = update_success_status(Some(&current), NOW, Some(provider_status));
        assert_eq!(
            status.properties,
            Some(json!({"certificates": [{"name": "signer", "version": "v2"}]}))
        );
    }

    #[test]
    fn test_success_on_fresh_resource() {
        let status = update_success_status(None, NOW, None);
        assert!(status.is_success);
        assert!(status.properties.is_none());
    }
}
