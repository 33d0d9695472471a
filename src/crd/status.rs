//! # KeyManagementSystem Status
//!
//! Observed state written back after every reconciliation attempt.

use serde::{Deserialize, Serialize};

/// Status of the KeyManagementSystem resource
///
/// `lastFetchedTime` records the last attempt, successful or not.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyManagementSystemStatus {
    /// Whether certificates were fetched successfully
    #[serde(default)]
    pub is_success: bool,
    /// Error message if the operation was unsuccessful
    #[serde(default)]
    pub error: String,
    /// Truncated error message for compact display
    #[serde(default)]
    pub brief_error: String,
    /// Time of the last fetch attempt (RFC3339)
    #[serde(default)]
    pub last_fetched_time: Option<String>,
    /// Provider-specific properties of each fetched certificate
    /// Kept from the previous cycle when a fetch returns no metadata
    #[serde(default)]
    #[schemars(schema_with = "super::preserve_unknown_fields")]
    pub properties: Option<serde_json::Value>,
}
