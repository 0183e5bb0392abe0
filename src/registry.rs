//! Process-wide registry mapping isolation scopes to client bundles
//!
//! Populated once during single-threaded setup, read-only during the test
//! run, drained once at teardown. No locking: the harness owns the map and
//! never mutates it after setup completes, so readers see either nothing
//! or the fully populated registry.

use std::collections::BTreeMap;

use crate::clients::ClientSet;
use crate::error::{Error, Result};
use crate::tenancy::{Tenancy, TenancyKey};

/// Registry of per-scope client bundles, keyed by partition.
///
/// Entries are write-once: a duplicate `put` is a setup bug and fails. If
/// setup dies partway, entries inserted so far stay visible so teardown
/// can release their connections.
pub struct Registry {
    entries: BTreeMap<TenancyKey, ClientSet>,
    default_key: TenancyKey,
}

impl Registry {
    /// Create an empty registry with the given default scope
    pub fn new(default_key: TenancyKey) -> Self {
        Self {
            entries: BTreeMap::new(),
            default_key,
        }
    }

    /// The default scope's key
    pub fn default_key(&self) -> &TenancyKey {
        &self.default_key
    }

    /// Insert the client bundle for a scope. Fails if the scope is
    /// already registered.
    pub fn put(&mut self, key: TenancyKey, set: ClientSet) -> Result<()> {
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateTenancy(key.partition));
        }
        self.entries.insert(key, set);
        Ok(())
    }

    /// Look up the client bundle for a scope
    pub fn get(&self, key: &TenancyKey) -> Option<&ClientSet> {
        self.entries.get(key)
    }

    /// The default scope's client bundle. Panics only if called before
    /// the default entry was inserted, which setup does first.
    pub fn default_clients(&self) -> Result<&ClientSet> {
        self.entries
            .get(&self.default_key)
            .ok_or(Error::ClientUnavailable("default scope"))
    }

    /// Client bundle for a test tenancy (resolved through its key)
    pub fn for_tenancy(&self, tenancy: &Tenancy) -> Option<&ClientSet> {
        self.get(&tenancy.key())
    }

    /// All registered scope keys, in partition order
    pub fn keys(&self) -> impl Iterator<Item = &TenancyKey> {
        self.entries.keys()
    }

    /// Number of registered scopes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no scopes are registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every entry, for teardown iteration. After this
    /// the registry is empty and nothing is ever re-inserted.
    pub fn drain(&mut self) -> Vec<(TenancyKey, ClientSet)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_write_once() {
        let mut registry = Registry::new(TenancyKey::default_key());
        registry
            .put(TenancyKey::default_key(), ClientSet::new())
            .unwrap();
        let err = registry
            .put(TenancyKey::default_key(), ClientSet::new())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTenancy(p) if p == "default"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn partial_population_survives_for_teardown() {
        let mut registry = Registry::new(TenancyKey::default_key());
        registry
            .put(TenancyKey::default_key(), ClientSet::new())
            .unwrap();
        // Setup "fails" before inserting p1; the default entry must still
        // be drainable.
        let drained = registry.drain();
        assert_eq!(drained.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn lookup_by_tenancy_uses_partition_only() {
        let mut registry = Registry::new(TenancyKey::default_key());
        registry.put(TenancyKey::new("p1"), ClientSet::new()).unwrap();
        assert!(registry.for_tenancy(&Tenancy::new("p1", "ns-a")).is_some());
        assert!(registry.for_tenancy(&Tenancy::new("p1", "ns-b")).is_some());
        assert!(registry.for_tenancy(&Tenancy::new("p2", "ns-a")).is_none());
    }

    #[test]
    fn default_clients_requires_default_entry() {
        let mut registry = Registry::new(TenancyKey::default_key());
        assert!(registry.default_clients().is_err());
        registry
            .put(TenancyKey::default_key(), ClientSet::new())
            .unwrap();
        assert!(registry.default_clients().is_ok());
    }

    #[test]
    fn keys_iterate_in_partition_order() {
        let mut registry = Registry::new(TenancyKey::default_key());
        registry.put(TenancyKey::new("p1"), ClientSet::new()).unwrap();
        registry
            .put(TenancyKey::default_key(), ClientSet::new())
            .unwrap();
        let keys: Vec<_> = registry.keys().map(|k| k.partition.as_str()).collect();
        assert_eq!(keys, vec!["default", "p1"]);
    }
}
