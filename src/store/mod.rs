//! # Certificate Map
//!
//! Process-wide map from resource identity (`namespace/name`) to the most
//! recently fetched certificate chain.
//!
//! The reconciler is the only writer. Chains are replaced whole, so a reader
//! sees either the previous or the new chain, never a mix.

use crate::observability::metrics;
use crate::provider::Certificate;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Shared certificate chain
pub type CertificateChain = Arc<Vec<Certificate>>;

#[derive(Debug, Default)]
pub struct CertificateMap {
    entries: DashMap<String, CertificateChain>,
}

impl CertificateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the chain for a resource, replacing any previous one
    pub fn set_certificates(&self, resource: &str, certificates: Vec<Certificate>) {
        let count = certificates.len();
        self.entries
            .insert(resource.to_string(), Arc::new(certificates));
        metrics::set_resources_cached(self.entries.len());
        debug!(resource = resource, count = count, "Stored certificates");
    }

    /// Chain for a resource; empty when the resource is unknown
    pub fn get_certificates(&self, resource: &str) -> CertificateChain {
        self.entries
            .get(resource)
            .map(|entry| Arc::clone(entry.value()))
            .unwrap_or_default()
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.entries.contains_key(resource)
    }

    /// Remove the chain for a resource
    ///
    /// Returns `true` if an entry was removed.
    pub fn delete_certificates(&self, resource: &str) -> bool {
        let removed = self.entries.remove(resource).is_some();
        if removed {
            metrics::set_resources_cached(self.entries.len());
            debug!(resource = resource, "Removed certificates");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys of every resource with a stored chain, sorted
    pub fn resource_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::decode_certificates;

    fn chain(count: usize) -> Vec<Certificate> {
        (0..count)
            .map(|i| {
                let pem = rcgen::generate_simple_self_signed(vec![format!("host{i}.example.com")])
                    .unwrap()
                    .cert
                    .pem();
                decode_certificates(pem.as_bytes()).unwrap().remove(0)
            })
            .collect()
    }

    #[test]
    fn test_set_then_get() {
        let map = CertificateMap::new();
        let certificates = chain(2);
        map.set_certificates("default/certs", certificates.clone());

        assert_eq!(*map.get_certificates("default/certs"), certificates);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_unknown_resource_is_empty() {
        let map = CertificateMap::new();
        assert!(map.get_certificates("default/missing").is_empty());
        assert!(!map.contains("default/missing"));
    }

    #[test]
    fn test_delete() {
        let map = CertificateMap::new();
        map.set_certificates("default/certs", chain(1));

        assert!(map.delete_certificates("default/certs"));
        assert!(map.get_certificates("default/certs").is_empty());
        assert!(!map.delete_certificates("default/certs"));
    }

    #[test]
    fn test_overwrite_replaces_whole_chain() {
        let map = CertificateMap::new();
        map.set_certificates("default/certs", chain(3));
        let held = map.get_certificates("default/certs");

        map.set_certificates("default/certs", chain(1));

        // Readers holding the old chain keep a consistent snapshot
        assert_eq!(held.len(), 3);
        assert_eq!(map.get_certificates("default/certs").len(), 1);
    }

    #[test]
    fn test_resource_keys_sorted() {
        let map = CertificateMap::new();
        map.set_certificates("ns-b/certs", Vec::new());
        map.set_certificates("ns-a/certs", Vec::new());
        assert_eq!(map.resource_keys(), vec!["ns-a/certs", "ns-b/certs"]);
    }

    #[test]
    fn test_concurrent_access() {
        let map = Arc::new(CertificateMap::new());
        let certificates = chain(1);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let map = Arc::clone(&map);
                let certificates = certificates.clone();
                std::thread::spawn(move || {
                    let key = format!("ns/{i}");
                    for _ in 0..50 {
                        map.set_certificates(&key, certificates.clone());
                        assert_eq!(map.get_certificates(&key).len(), 1);
                    }
                    map.delete_certificates(&key);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(map.is_empty());
    }
}
