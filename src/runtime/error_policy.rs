//! # Error Policy
//!
//! Error handling for failed reconciliation cycles.
//!
//! Nothing is requeued here: configuration errors need a spec change and fetch
//! errors are retried on the next change notification.

use crate::controller::reconciler::ReconcilerError;
use crate::crd::ResourceKey;
use crate::observability;
use tracing::{debug, error, info};

/// Log and count a failed cycle
pub fn handle_reconciliation_error(key: &ResourceKey, error: &ReconcilerError) {
    if matches!(error, ReconcilerError::Cancelled) {
        debug!(resource = %key, "Reconciliation cancelled");
        return;
    }

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = %key.name,
        resource.namespace = %key.namespace,
        error.reason = error.reason()
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}: {}", key, error);
    observability::metrics::increment_reconciliation_errors(error.reason());

    if let ReconcilerError::Provider { source, .. } = error {
        if source.is_transient() {
            info!("Fetch for {} will be retried on the next change notification", key);
        }
    }
}
