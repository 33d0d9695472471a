//! Key Management Controller Library
//!
//! This library provides the core functionality for the Key Management Controller:
//! pluggable credential providers resolved through a named registry, the
//! reconciliation state machine for `KeyManagementSystem` resources, the
//! process-wide certificate store and the TTL cache.
//! Tests are included in the module files and under `tests/`.

pub mod auth;
pub mod cache;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod provider;
pub mod registry;
pub mod runtime;
pub mod store;

// Re-export CRD types for convenience
pub use crd::*;
