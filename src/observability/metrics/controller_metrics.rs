//! # Controller Metrics
//!
//! Metrics for reconciliation cycles and the certificate map.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge};
use std::sync::LazyLock;

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "kms_reconciliations_total",
        "Total number of KeyManagementSystem reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "kms_reconciliation_errors_total",
            "Total number of failed KeyManagementSystem reconciliations",
        ),
        &["reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "kms_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static CERTIFICATES_FETCHED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "kms_certificates_fetched_total",
        "Total number of certificates fetched from providers",
    )
    .expect("Failed to create CERTIFICATES_FETCHED_TOTAL metric - this should never happen")
});

static RESOURCES_CACHED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "kms_resources_cached",
        "Current number of resources with certificates in the certificate map",
    )
    .expect("Failed to create RESOURCES_CACHED metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CERTIFICATES_FETCHED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOURCES_CACHED.clone()))?;
    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(reason: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

/// Failed reconciliations counted so far for `reason`
pub fn reconciliation_errors(reason: &str) -> u64 {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[reason]).get()
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_certificates_fetched(count: usize) {
    CERTIFICATES_FETCHED_TOTAL.inc_by(count as u64);
}

pub fn set_resources_cached(count: usize) {
    #[allow(clippy::cast_possible_wrap, reason = "Resource counts never approach i64::MAX")]
    let count_i64 = count as i64;
    RESOURCES_CACHED.set(count_i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        assert!(RECONCILIATIONS_TOTAL.get() > before);
    }

    #[test]
    fn test_increment_reconciliation_errors_by_reason() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["test_reason"])
            .get();
        increment_reconciliation_errors("test_reason");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["test_reason"])
            .get();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_increment_certificates_fetched() {
        let before = CERTIFICATES_FETCHED_TOTAL.get();
        increment_certificates_fetched(3);
        assert!(CERTIFICATES_FETCHED_TOTAL.get() >= before + 3);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        observe_reconciliation_duration(0.25);
        assert!(RECONCILIATION_DURATION.get_sample_count() >= 1);
    }
}
