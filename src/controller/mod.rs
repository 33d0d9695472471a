//! # Controller
//!
//! Reconciliation of `KeyManagementSystem` resources.
//!
//! - `orchestrator` - access to the resource platform (Kubernetes)
//! - `reconciler` - the fetch cycle and status management
//! - `server` - metrics and health probe endpoints

pub mod orchestrator;
pub mod reconciler;
pub mod server;

pub use orchestrator::{KubeOrchestrator, Orchestrator, OrchestratorError};
pub use reconciler::{ReconcileOutcome, Reconciler, ReconcilerError};
