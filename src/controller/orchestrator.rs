//! # Orchestrator
//!
//! The reconciler's view of the resource platform: load a resource, list the
//! competing `CertificateStore` resources and persist status.
//!
//! [`KubeOrchestrator`] is the Kubernetes implementation. Tests substitute an
//! in-memory implementation.

use crate::constants::FIELD_MANAGER;
use crate::crd::{CertificateStore, KeyManagementSystem, KeyManagementSystemStatus, ResourceKey};
use async_trait::async_trait;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("failed to serialize status: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("orchestrator unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Current state of a resource; `None` once it has been deleted
    async fn get(&self, key: &ResourceKey)
        -> Result<Option<KeyManagementSystem>, OrchestratorError>;

    /// Every `CertificateStore` in the cluster
    async fn list_certificate_stores(&self) -> Result<Vec<CertificateStore>, OrchestratorError>;

    /// Persist the status sub-document of a resource
    async fn update_status(
        &self,
        key: &ResourceKey,
        status: &KeyManagementSystemStatus,
    ) -> Result<(), OrchestratorError>;
}

/// Orchestrator backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeOrchestrator {
    client: Client,
}

impl std::fmt::Debug for KubeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeOrchestrator").finish_non_exhaustive()
    }
}

impl KubeOrchestrator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, key: &ResourceKey) -> Api<KeyManagementSystem> {
        Api::namespaced(self.client.clone(), &key.namespace)
    }
}

#[async_trait]
impl Orchestrator for KubeOrchestrator {
    async fn get(
        &self,
        key: &ResourceKey,
    ) -> Result<Option<KeyManagementSystem>, OrchestratorError> {
        Ok(self.api(key).get_opt(&key.name).await?)
    }

    async fn list_certificate_stores(&self) -> Result<Vec<CertificateStore>, OrchestratorError> {
        let api: Api<CertificateStore> = Api::all(self.client.clone());
        let stores = api.list(&ListParams::default()).await?;
        Ok(stores.items)
    }

    async fn update_status(
        &self,
        key: &ResourceKey,
        status: &KeyManagementSystemStatus,
    ) -> Result<(), OrchestratorError> {
        let patch = serde_json::json!({
            "status": serde_json::to_value(status)?
        });

        self.api(key)
            .patch_status(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(patch),
            )
            .await?;

        debug!(resource = %key, is_success = status.is_success, "Status updated");
        Ok(())
    }
}
