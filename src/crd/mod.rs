//! # Custom Resource Definitions
//!
//! CRD types for the Key Management Controller.
//!
//! This module contains the Kubernetes Custom Resource Definition types used by
//! the controller: `KeyManagementSystem`, which declares where trust material is
//! fetched from, and `CertificateStore`, the competing mechanism that must not be
//! configured at the same time.

mod status;

pub use status::KeyManagementSystemStatus;

use kube::CustomResource;
use schemars::{Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::fmt;

/// KeyManagementSystem Custom Resource Definition
///
/// Declares which credential provider supplies certificates for signature
/// verification. `parameters` is passed to the provider untouched.
///
/// # Example
///
/// ```yaml
/// apiVersion: trust-management.microscaler.io/v1
/// kind: KeyManagementSystem
/// metadata:
///   name: signing-certs
///   namespace: default
/// spec:
///   type: inline
///   parameters:
///     contentType: certificate
///     value: |
///       -----BEGIN CERTIFICATE-----
///       ...
///       -----END CERTIFICATE-----
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "KeyManagementSystem",
    group = "trust-management.microscaler.io",
    version = "v1",
    namespaced,
    status = "KeyManagementSystemStatus",
    shortname = "kms",
    printcolumn = r#"{"name":"IsSuccess", "type":"boolean", "jsonPath":".status.isSuccess"}, {"name":"Error", "type":"string", "jsonPath":".status.briefError"}, {"name":"LastFetchedTime", "type":"date", "jsonPath":".status.lastFetchedTime"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeyManagementSystemSpec {
    /// Name of the key management system provider (e.g. "inline", "azurekeyvault")
    #[serde(default)]
    pub r#type: String,
    /// Provider-specific parameters
    /// Must be a JSON object; the provider defines its shape
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub parameters: Option<serde_json::Value>,
}

/// CertificateStore Custom Resource Definition
///
/// A second, independent source of trust material. The controller only lists
/// these resources: while any exist, `KeyManagementSystem` reconciliation is
/// blocked because verification provenance would be ambiguous.
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "CertificateStore",
    group = "trust-management.microscaler.io",
    version = "v1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateStoreSpec {
    /// Name of the certificate store provider
    #[serde(default)]
    pub provider: String,
    /// Provider-specific parameters
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub parameters: Option<serde_json::Value>,
}

/// Identity of a `KeyManagementSystem` resource
///
/// Flattened to `namespace/name` when used as a certificate store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build the key from object metadata, defaulting the namespace like the API server does
    pub fn from_metadata(metadata: &kube::api::ObjectMeta) -> Self {
        Self::new(
            metadata.namespace.as_deref().unwrap_or("default"),
            metadata.name.as_deref().unwrap_or("unknown"),
        )
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Structural schema for opaque provider payloads
fn preserve_unknown_fields(_gen: &mut SchemaGenerator) -> Schema {
    let schema_value = serde_json::json!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    });
    Schema::try_from(schema_value).expect("Failed to create Schema for opaque parameters")
}
