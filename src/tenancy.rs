//! Tenancy model for isolation scopes
//!
//! A partition is an administratively separate slice of the catalog backend.
//! Backend processes are provisioned per-partition, so [`TenancyKey`] carries
//! only the partition and is the sole lookup key for per-scope resources.
//! [`Tenancy`] adds the namespace and is used when creating namespaced
//! resources; multiple tenancies share one key.

use std::fmt;

/// Identifies one isolation scope. Keyed by partition only: namespaces
/// within a partition share the same backend processes and clients.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TenancyKey {
    /// The partition name
    pub partition: String,
}

impl TenancyKey {
    /// Create a key for the given partition
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
        }
    }

    /// The key for the default partition
    pub fn default_key() -> Self {
        Self::new(DEFAULT_PARTITION)
    }

    /// Whether this key names the default partition
    pub fn is_default(&self) -> bool {
        self.partition == DEFAULT_PARTITION
    }
}

impl fmt::Display for TenancyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.partition)
    }
}

/// A logical test scope: partition plus namespace.
///
/// The namespace is empty when the catalog backend does not support
/// multi-tenancy; resource payloads then omit both fields.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tenancy {
    /// The partition this scope lives in
    pub partition: String,
    /// The namespace within the partition, empty if unnamespaced
    pub namespace: String,
}

/// Name of the default partition and namespace
pub const DEFAULT_PARTITION: &str = "default";

impl Tenancy {
    /// Create a tenancy for the given partition and namespace
    pub fn new(partition: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            namespace: namespace.into(),
        }
    }

    /// The default tenancy (default partition, default namespace)
    pub fn default_tenancy() -> Self {
        Self::new(DEFAULT_PARTITION, DEFAULT_PARTITION)
    }

    /// An unnamespaced tenancy in the default partition, used when the
    /// catalog edition has no multi-tenancy support.
    pub fn unnamespaced() -> Self {
        Self::new(DEFAULT_PARTITION, "")
    }

    /// The registry key for this scope
    pub fn key(&self) -> TenancyKey {
        TenancyKey::new(self.partition.clone())
    }
}

impl fmt::Display for Tenancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.partition)
        } else {
            write!(f, "{}.{}", self.partition, self.namespace)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn key_equality_ignores_namespace() {
        let a = Tenancy::new("p1", "ns1");
        let b = Tenancy::new("p1", "ns2");
        assert_ne!(a, b);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn keys_order_by_partition() {
        let mut map = BTreeMap::new();
        map.insert(TenancyKey::new("p1"), 1);
        map.insert(TenancyKey::default_key(), 0);
        let keys: Vec<_> = map.keys().map(|k| k.partition.as_str()).collect();
        assert_eq!(keys, vec!["default", "p1"]);
    }

    #[test]
    fn default_detection() {
        assert!(TenancyKey::default_key().is_default());
        assert!(!TenancyKey::new("p1").is_default());
        assert_eq!(Tenancy::default_tenancy().key(), TenancyKey::default_key());
    }

    #[test]
    fn display_collapses_empty_namespace() {
        assert_eq!(Tenancy::unnamespaced().to_string(), "default");
        assert_eq!(Tenancy::new("p1", "ns1").to_string(), "p1.ns1");
    }
}
