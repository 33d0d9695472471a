//! # Observability
//!
//! Prometheus metrics. Logging goes through `tracing` and is configured in
//! [`crate::runtime::initialization`].

pub mod metrics;
