//! # TTL Cache
//!
//! Concurrent key/value cache with optional per-entry expiry.
//!
//! Expiry is a soft deadline: an expired entry is invisible to `get` as soon as
//! its deadline passes, while physical removal happens lazily on access, on
//! insertion pressure, or in the background janitor.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    /// Insertion sequence, matched against the eviction queue
    sequence: u64,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Insertion order of a bounded cache
///
/// Queue items whose sequence no longer matches the stored entry are stale
/// (overwritten, deleted or expired) and skipped on eviction.
#[derive(Debug)]
struct EvictionOrder<K> {
    queue: VecDeque<(K, u64)>,
    /// Earliest deadline of any entry that may still be stored
    next_expiry: Option<Instant>,
}

/// Bounded concurrent cache with optional expiry
///
/// `max_entries == 0` means unbounded. Writes to a bounded cache are
/// serialized so the bound holds under concurrent writers; reads never block
/// on writers of other shards.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, Entry<V>>,
    max_entries: usize,
    sequence: AtomicU64,
    order: Mutex<EvictionOrder<K>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            sequence: AtomicU64::new(0),
            order: Mutex::new(EvictionOrder {
                queue: VecDeque::new(),
                next_expiry: None,
            }),
        }
    }

    /// Store a value without expiry
    pub fn set(&self, key: K, value: V) -> bool {
        self.insert(key, value, None)
    }

    /// Store a value that expires after `ttl`
    ///
    /// A zero `ttl` stores the value without expiry.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return self.insert(key, value, None);
        }
        self.insert(key, value, Instant::now().checked_add(ttl))
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if !entry.is_expired(now) {
            return Some(entry.value.clone());
        }

        // The shard guard must be released before removing from the same shard
        drop(entry);
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    pub fn delete(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut order = self.lock_order();
        self.entries.clear();
        order.queue.clear();
        order.next_expiry = None;
    }

    /// Number of stored entries, including expired ones not yet removed
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Remove every expired entry
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        if self.max_entries == 0 {
            return Self::purge(&self.entries, now).0;
        }
        let mut order = self.lock_order();
        let (removed, next_expiry) = Self::purge(&self.entries, now);
        order.next_expiry = next_expiry;
        removed
    }

    fn insert(&self, key: K, value: V, expires_at: Option<Instant>) -> bool {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            value,
            sequence,
            expires_at,
        };

        if self.max_entries == 0 {
            self.entries.insert(key, entry);
            return true;
        }

        let mut order = self.lock_order();
        if !self.entries.contains_key(&key) {
            self.make_room(&mut order);
        }
        self.entries.insert(key.clone(), entry);
        order.queue.push_back((key, sequence));
        if let Some(deadline) = expires_at {
            order.next_expiry = Some(order.next_expiry.map_or(deadline, |next| next.min(deadline)));
        }

        if order.queue.len() > self.max_entries.saturating_mul(2) {
            let entries = &self.entries;
            order.queue.retain(|(key, sequence)| {
                entries
                    .get(key)
                    .is_some_and(|entry| entry.sequence == *sequence)
            });
        }
        true
    }

    /// Free one slot: purge expired entries if any are due, else evict the oldest insertion
    fn make_room(&self, order: &mut EvictionOrder<K>) {
        if self.entries.len() < self.max_entries {
            return;
        }

        let now = Instant::now();
        if order.next_expiry.is_some_and(|deadline| deadline <= now) {
            order.next_expiry = Self::purge(&self.entries, now).1;
        }

        while self.entries.len() >= self.max_entries {
            let Some((key, sequence)) = order.queue.pop_front() else {
                break;
            };
            self.entries
                .remove_if(&key, |_, entry| entry.sequence == sequence);
        }
    }

    /// Remove expired entries, returning the count and the earliest remaining deadline
    fn purge(entries: &DashMap<K, Entry<V>>, now: Instant) -> (usize, Option<Instant>) {
        let mut removed = 0;
        let mut next_expiry: Option<Instant> = None;
        entries.retain(|_, entry| {
            if entry.is_expired(now) {
                removed += 1;
                return false;
            }
            if let Some(deadline) = entry.expires_at {
                next_expiry = Some(next_expiry.map_or(deadline, |next| next.min(deadline)));
            }
            true
        });
        (removed, next_expiry)
    }

    fn lock_order(&self) -> MutexGuard<'_, EvictionOrder<K>> {
        self.order.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Periodically purge expired entries
    ///
    /// The task holds only a weak reference and exits once the cache is dropped.
    pub fn spawn_janitor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        let period = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    debug!("Cache dropped, stopping janitor");
                    break;
                };

                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(
                        removed = removed,
                        remaining = cache.len(),
                        "Purged expired cache entries"
                    );
                }
            }
        })
    }
}
