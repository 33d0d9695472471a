//! # Watch Loop
//!
//! Drives reconciliation from `KeyManagementSystem` watch events.
//!
//! - Applied objects are reconciled when their generation or the manual
//!   reconcile annotation changed. Status writes bump neither, so they never
//!   trigger a new cycle.
//! - Deleted objects are reconciled too; the cycle observes the missing
//!   object and removes its certificates.
//! - Cycles for one resource run one at a time; different resources run
//!   concurrently.

use super::error_policy::handle_reconciliation_error;
use crate::constants::{DEFAULT_WATCH_RESTART_DELAY_SECS, RECONCILE_ANNOTATION};
use crate::controller::reconciler::Reconciler;
use crate::crd::{KeyManagementSystem, ResourceKey};
use anyhow::Result;
use futures::{pin_mut, StreamExt};
use kube::Api;
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fields whose change triggers a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
struct Trigger {
    generation: Option<i64>,
    reconcile_annotation: Option<String>,
}

impl Trigger {
    fn of(kms: &KeyManagementSystem) -> Self {
        Self {
            generation: kms.metadata.generation,
            reconcile_annotation: kms
                .metadata
                .annotations
                .as_ref()
                .and_then(|annotations| annotations.get(RECONCILE_ANNOTATION))
                .cloned(),
        }
    }
}

/// Last seen trigger fields per resource
#[derive(Debug, Default)]
pub struct TriggerTracker {
    seen: HashMap<ResourceKey, Trigger>,
}

impl TriggerTracker {
    /// Record an applied object; `true` if it needs a cycle
    pub fn should_reconcile(&mut self, kms: &KeyManagementSystem) -> bool {
        let key = ResourceKey::from_metadata(&kms.metadata);
        let trigger = Trigger::of(kms);
        match self.seen.insert(key, trigger.clone()) {
            Some(previous) => previous != trigger,
            None => true,
        }
    }

    pub fn forget(&mut self, key: &ResourceKey) {
        self.seen.remove(key);
    }

    /// Drop every resource not in `present`, returning the dropped keys
    ///
    /// Used after a relist to find deletions missed while disconnected.
    pub fn retain(&mut self, present: &HashSet<ResourceKey>) -> Vec<ResourceKey> {
        let missing: Vec<ResourceKey> = self
            .seen
            .keys()
            .filter(|key| !present.contains(*key))
            .cloned()
            .collect();
        for key in &missing {
            self.seen.remove(key);
        }
        missing
    }
}

/// Runs cycles, one at a time per resource
#[derive(Debug)]
pub struct Dispatcher {
    reconciler: Arc<Reconciler>,
    locks: Mutex<HashMap<ResourceKey, Arc<tokio::sync::Mutex<()>>>>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(reconciler: Arc<Reconciler>, shutdown: CancellationToken) -> Self {
        Self {
            reconciler,
            locks: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Spawn a cycle for `key` onto `tasks`
    pub fn dispatch(self: &Arc<Self>, key: ResourceKey, tasks: &mut JoinSet<()>) {
        let dispatcher = Arc::clone(self);
        tasks.spawn(async move {
            let lock = dispatcher.lock_for(&key);
            {
                let _guard = lock.lock().await;
                let cancel = dispatcher.shutdown.child_token();
                match dispatcher.reconciler.reconcile(&key, &cancel).await {
                    Ok(outcome) => debug!(resource = %key, outcome = ?outcome, "Reconciliation complete"),
                    Err(e) => handle_reconciliation_error(&key, &e),
                }
            }
            dispatcher.release(&key, lock);
        });
    }

    fn lock_for(&self, key: &ResourceKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Remove the lock once no other cycle holds or waits for it
    fn release(&self, key: &ResourceKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // One reference in the map plus ours
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    /// Number of resources with a running or queued cycle
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

/// Event handling state of one watch loop
struct EventHandler {
    dispatcher: Arc<Dispatcher>,
    triggers: TriggerTracker,
    relist: Option<HashSet<ResourceKey>>,
}

impl EventHandler {
    fn handle(&mut self, event: watcher::Event<KeyManagementSystem>, tasks: &mut JoinSet<()>) {
        match event {
            watcher::Event::Apply(kms) => self.apply(&kms, tasks),
            watcher::Event::Delete(kms) => {
                let key = ResourceKey::from_metadata(&kms.metadata);
                info!(resource = %key, "KeyManagementSystem deleted");
                self.triggers.forget(&key);
                self.dispatcher.dispatch(key, tasks);
            }
            watcher::Event::Init => {
                self.relist = Some(HashSet::new());
            }
            watcher::Event::InitApply(kms) => {
                if let Some(relist) = self.relist.as_mut() {
                    relist.insert(ResourceKey::from_metadata(&kms.metadata));
                }
                self.apply(&kms, tasks);
            }
            watcher::Event::InitDone => {
                let present = self.relist.take().unwrap_or_default();
                info!(resources = present.len(), "KeyManagementSystem list synced");
                for key in self.triggers.retain(&present) {
                    info!(resource = %key, "KeyManagementSystem removed while disconnected");
                    self.dispatcher.dispatch(key, tasks);
                }
            }
        }
    }

    fn apply(&mut self, kms: &KeyManagementSystem, tasks: &mut JoinSet<()>) {
        let key = ResourceKey::from_metadata(&kms.metadata);
        if self.triggers.should_reconcile(kms) {
            self.dispatcher.dispatch(key, tasks);
        } else {
            debug!(resource = %key, "Skipping event without spec or annotation change");
        }
    }
}

/// Watch `api` and reconcile until `shutdown` fires
///
/// In-flight cycles are cancelled through child tokens and awaited before
/// returning.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn run_watch_loop(
    api: Api<KeyManagementSystem>,
    reconciler: Arc<Reconciler>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut handler = EventHandler {
        dispatcher: Arc::new(Dispatcher::new(reconciler, shutdown.clone())),
        triggers: TriggerTracker::default(),
        relist: None,
    };
    let mut tasks = JoinSet::new();

    info!("Starting KeyManagementSystem watch");
    'watch: while !shutdown.is_cancelled() {
        let stream = watcher(api.clone(), watcher::Config::default()).default_backoff();
        pin_mut!(stream);

        loop {
            // Reap finished cycles
            while tasks.try_join_next().is_some() {}

            tokio::select! {
                () = shutdown.cancelled() => break 'watch,
                event = stream.next() => match event {
                    Some(Ok(event)) => handler.handle(event, &mut tasks),
                    Some(Err(e)) => warn!("Error watching KeyManagementSystem resources: {}", e),
                    None => break,
                },
            }
        }

        warn!(
            "KeyManagementSystem watch stream ended, restarting in {}s",
            DEFAULT_WATCH_RESTART_DELAY_SECS
        );
        tokio::select! {
            () = shutdown.cancelled() => break 'watch,
            () = tokio::time::sleep(Duration::from_secs(DEFAULT_WATCH_RESTART_DELAY_SECS)) => {}
        }
    }

    info!(
        in_flight = handler.dispatcher.active(),
        "Shutdown requested, waiting for in-flight reconciliations"
    );
    while tasks.join_next().await.is_some() {}
    info!("Watch loop stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::KeyManagementSystemSpec;
    use std::collections::BTreeMap;

    fn kms(name: &str, generation: i64, annotation: Option<&str>) -> KeyManagementSystem {
        let mut kms = KeyManagementSystem::new(name, KeyManagementSystemSpec::default());
        kms.metadata.namespace = Some("default".to_string());
        kms.metadata.generation = Some(generation);
        kms.metadata.annotations = annotation.map(|value| {
            BTreeMap::from([(RECONCILE_ANNOTATION.to_string(), value.to_string())])
        });
        kms
    }

    #[test]
    fn test_first_sight_triggers() {
        let mut tracker = TriggerTracker::default();
        assert!(tracker.should_reconcile(&kms("certs", 1, None)));
    }

    #[test]
    fn test_status_only_update_is_filtered() {
        let mut tracker = TriggerTracker::default();
        let mut object = kms("certs", 1, None);
        assert!(tracker.should_reconcile(&object));

        object.status = Some(crate::crd::KeyManagementSystemStatus {
            is_success: true,
            ..Default::default()
        });
        assert!(!tracker.should_reconcile(&object));
    }

    #[test]
    fn test_generation_change_triggers() {
        let mut tracker = TriggerTracker::default();
        assert!(tracker.should_reconcile(&kms("certs", 1, None)));
        assert!(tracker.should_reconcile(&kms("certs", 2, None)));
    }

    #[test]
    fn test_annotation_change_triggers() {
        let mut tracker = TriggerTracker::default();
        assert!(tracker.should_reconcile(&kms("certs", 1, None)));
        assert!(tracker.should_reconcile(&kms("certs", 1, Some("2024-01-01T00:00:00Z"))));
        assert!(!tracker.should_reconcile(&kms("certs", 1, Some("2024-01-01T00:00:00Z"))));
    }

    #[test]
    fn test_forget_makes_next_apply_trigger() {
        let mut tracker = TriggerTracker::default();
        let object = kms("certs", 1, None);
        assert!(tracker.should_reconcile(&object));
        tracker.forget(&ResourceKey::new("default", "certs"));
        assert!(tracker.should_reconcile(&object));
    }

    #[test]
    fn test_retain_reports_missing_resources() {
        let mut tracker = TriggerTracker::default();
        tracker.should_reconcile(&kms("kept", 1, None));
        tracker.should_reconcile(&kms("gone", 1, None));

        let present = HashSet::from([ResourceKey::new("default", "kept")]);
        assert_eq!(
            tracker.retain(&present),
            vec![ResourceKey::new("default", "gone")]
        );
        assert!(!tracker.should_reconcile(&kms("kept", 1, None)));
    }
}
