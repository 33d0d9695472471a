//! # Reconciler
//!
//! One fetch cycle per change notification for a `KeyManagementSystem`.
//!
//! ## Cycle
//!
//! 1. **Load**: a missing resource removes its certificates and ends the cycle
//! 2. **Conflict check**: any `CertificateStore` blocks the fetch
//! 3. **Resolve**: parameters plus `type` go through the provider registry
//! 4. **Fetch**: certificates are published to the [`CertificateMap`]
//! 5. **Status**: success or error is written back, `lastFetchedTime` always advances
//!
//! Cycles for different resources run concurrently; each one only touches its
//! own map entry and status document.

pub mod spec;
pub mod status;

pub use spec::{parameters_to_config, spec_to_provider};
pub use status::{brief_error, update_error_status, update_success_status, write_status};

use crate::config::ControllerConfig;
use crate::controller::orchestrator::{Orchestrator, OrchestratorError};
use crate::crd::{KeyManagementSystem, ResourceKey};
use crate::observability::metrics;
use crate::provider::{KmsRegistry, ProviderError};
use crate::registry::RegistryError;
use crate::store::CertificateMap;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

/// Result of a completed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The resource no longer exists and its certificates were removed
    Deleted,
    /// Certificates were fetched and published
    Fetched { count: usize },
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("certificate store already exists: key management system and certificate store cannot be configured together")]
    Conflict,
    #[error("failed to parse key management system config: {0}")]
    InvalidConfig(String),
    #[error("failed to create key management system provider: {0}")]
    ProviderCreation(#[source] RegistryError),
    #[error("Error fetching certificates in KMS {resource} with {provider} provider, error: {source}")]
    Provider {
        resource: String,
        provider: String,
        #[source]
        source: ProviderError,
    },
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ReconcilerError {
    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::Conflict => "conflict",
            ReconcilerError::InvalidConfig(_) => "invalid_config",
            ReconcilerError::ProviderCreation(_) => "provider_creation",
            ReconcilerError::Provider { .. } => "fetch",
            ReconcilerError::Orchestrator(_) => "orchestrator",
            ReconcilerError::Cancelled => "cancelled",
        }
    }
}

/// Reconciler context shared by every cycle
pub struct Reconciler {
    orchestrator: Arc<dyn Orchestrator>,
    kms_registry: Arc<KmsRegistry>,
    certificates: Arc<CertificateMap>,
    config: ControllerConfig,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("kms_registry", &self.kms_registry)
            .field("resources", &self.certificates.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        kms_registry: Arc<KmsRegistry>,
        certificates: Arc<CertificateMap>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            orchestrator,
            kms_registry,
            certificates,
            config,
        }
    }

    pub fn certificates(&self) -> &Arc<CertificateMap> {
        &self.certificates
    }

    /// Run one cycle for `key`
    ///
    /// # Errors
    ///
    /// Every error except [`ReconcilerError::Cancelled`] and failures to load
    /// the resource has already been written to the resource's status.
    pub async fn reconcile(
        &self,
        key: &ResourceKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let span = info_span!("reconcile", resource = %key);
        let start = Instant::now();
        metrics::increment_reconciliations();

        let result = self.run_cycle(key, cancel).instrument(span).await;

        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        result
    }

    async fn run_cycle(
        &self,
        key: &ResourceKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let resource = key.to_string();
        info!("Reconciling key management system");

        let Some(kms) = self.orchestrator.get(key).await? else {
            info!("Deletion detected, removing key management system certificates");
            self.certificates.delete_certificates(&resource);
            return Ok(ReconcileOutcome::Deleted);
        };

        if cancel.is_cancelled() {
            return Err(ReconcilerError::Cancelled);
        }

        let last_fetched_time = Utc::now().to_rfc3339();

        let stores = self.orchestrator.list_certificate_stores().await?;
        if !stores.is_empty() {
            let err = ReconcilerError::Conflict;
            error!(certificate_stores = stores.len(), error = %err, "Conflicting trust configuration");
            self.write_error(key, &kms, &err, &last_fetched_time, cancel)
                .await;
            return Err(err);
        }

        let provider = match spec_to_provider(&self.kms_registry, &kms.spec, &self.config) {
            Ok(provider) => provider,
            Err(err) => {
                self.write_error(key, &kms, &err, &last_fetched_time, cancel)
                    .await;
                return Err(err);
            }
        };

        let fetched = match provider.fetch_certificates(cancel).await {
            Ok(fetched) => fetched,
            Err(ProviderError::Cancelled { .. }) => return Err(ReconcilerError::Cancelled),
            Err(source) => {
                // The status carries the provider's own message
                self.write_error(key, &kms, &source, &last_fetched_time, cancel)
                    .await;
                return Err(ReconcilerError::Provider {
                    resource,
                    provider: kms.spec.r#type.clone(),
                    source,
                });
            }
        };

        let count = fetched.certificates.len();
        self.certificates.set_certificates(&resource, fetched.certificates);
        metrics::increment_certificates_fetched(count);

        let status = update_success_status(kms.status.as_ref(), &last_fetched_time, fetched.status);
        write_status(self.orchestrator.as_ref(), key, &status, cancel).await;

        info!(
            count = count,
            provider = %kms.spec.r#type,
            "Certificates fetched for key management system"
        );
        Ok(ReconcileOutcome::Fetched { count })
    }

    async fn write_error(
        &self,
        key: &ResourceKey,
        kms: &KeyManagementSystem,
        err: &(dyn std::error::Error + Send + Sync),
        last_fetched_time: &str,
        cancel: &CancellationToken,
    ) {
        let status = update_error_status(kms.status.as_ref(), &err.to_string(), last_fetched_time);
        write_status(self.orchestrator.as_ref(), key, &status, cancel).await;
    }
}
