//! Seeding of cross-cutting test resources
//!
//! Runs once per isolation scope after all backends are up. Order matters:
//! partitions exist before namespaces (created during catalog replication),
//! namespaces exist before any namespaced registration, and a settling
//! delay follows each tenancy so the catalog propagates registrations
//! before tests query them. Registering into a namespace that does not
//! exist yet is a setup-fatal error.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::clients::{
    CatalogEdition, CatalogRegistration, ConnectSettings, PeeringTokenRequest, ServiceAddress,
    ServiceRegistration, SidecarProxy, KIND_CONNECT_PROXY,
};
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::tenancy::Tenancy;

/// Node address used for all seeded registrations
const SEED_NODE_ADDRESS: &str = "127.0.0.1";

/// Peer names for the two seeded peering tokens
const PEER_NAMES: [&str; 2] = ["foo", "bar"];

/// Seeds the fixed set of test resources into every isolation scope
pub struct ResourceSeeder<'a> {
    registry: &'a Registry,
    edition: CatalogEdition,
    settle_delay: Duration,
}

impl<'a> ResourceSeeder<'a> {
    /// Create a seeder over a fully populated registry
    pub fn new(registry: &'a Registry, edition: CatalogEdition, settle_delay: Duration) -> Self {
        Self {
            registry,
            edition,
            settle_delay,
        }
    }

    /// The test tenancies: registered partitions crossed with the
    /// configured namespaces. Collapses to a single unnamespaced tenancy
    /// when the edition has no multi-tenancy support.
    pub fn test_tenancies(&self, namespaces: &[String]) -> Vec<Tenancy> {
        if !self.edition.is_multi_tenant() {
            return vec![Tenancy::unnamespaced()];
        }
        let mut tenancies = Vec::new();
        for key in self.registry.keys() {
            for ns in namespaces {
                tenancies.push(Tenancy::new(key.partition.clone(), ns.clone()));
            }
        }
        tenancies
    }

    /// Seed everything: namespaces first, then per-tenancy registrations
    /// and peering tokens, settling after each tenancy.
    pub async fn seed_all(&self, tenancies: &[Tenancy]) -> Result<()> {
        self.create_namespaces(tenancies).await?;
        for tenancy in tenancies {
            self.register_tenancy_resources(tenancy).await?;
            self.create_peerings(tenancy).await?;
            debug!(%tenancy, "settling after seed");
            sleep(self.settle_delay).await;
        }
        info!(tenancies = tenancies.len(), "test resources seeded");
        Ok(())
    }

    /// Create the namespace for every namespaced tenancy. Must run before
    /// any registration into those namespaces.
    pub async fn create_namespaces(&self, tenancies: &[Tenancy]) -> Result<()> {
        if !self.edition.is_multi_tenant() {
            return Ok(());
        }
        for tenancy in tenancies {
            if tenancy.namespace.is_empty() {
                continue;
            }
            let clients = self
                .registry
                .for_tenancy(tenancy)
                .ok_or_else(|| Error::seed(format!("no clients for tenancy {tenancy}")))?;
            clients
                .catalog()?
                .create_namespace(&tenancy.namespace, &tenancy.partition)
                .await
                .map_err(|e| {
                    Error::seed(format!("failed to create namespace {tenancy}: {e}"))
                })?;
            debug!(%tenancy, "namespace created");
        }
        Ok(())
    }

    /// Register the fixed service set for one tenancy: a plain service
    /// with metadata, a service with tagged addresses, and a
    /// connect-enabled service paired with its sidecar proxy.
    pub async fn register_tenancy_resources(&self, tenancy: &Tenancy) -> Result<()> {
        let clients = self
            .registry
            .for_tenancy(tenancy)
            .ok_or_else(|| Error::seed(format!("no clients for tenancy {tenancy}")))?;
        let catalog = clients.catalog()?;

        // Payload tenancy fields are set only when the edition understands
        // them; service names always carry the tenancy for uniqueness.
        let (partition, namespace) = if self.edition.is_multi_tenant() {
            (tenancy.partition.clone(), tenancy.namespace.clone())
        } else {
            (String::new(), String::new())
        };
        let node = catalog
            .node_name()
            .await
            .map_err(|e| Error::seed(format!("failed to resolve node name: {e}")))?;
        let suffix = format!("{}-{}", tenancy.partition, tenancy.namespace);

        let registrations = [
            // Plain service with static metadata.
            ServiceRegistration {
                id: format!("service-meta-{suffix}"),
                service: format!("service-meta-{suffix}"),
                tags: vec!["tag1".to_string()],
                meta: BTreeMap::from([("meta1".to_string(), "value1".to_string())]),
                partition: partition.clone(),
                namespace: namespace.clone(),
                ..Default::default()
            },
            // Service exposing network-level tagged addresses.
            ServiceRegistration {
                id: format!("service-taggedAddresses-{suffix}"),
                service: format!("service-taggedAddresses-{suffix}"),
                tagged_addresses: BTreeMap::from([
                    (
                        "lan".to_string(),
                        ServiceAddress {
                            address: "192.0.2.1".to_string(),
                            port: 80,
                        },
                    ),
                    (
                        "wan".to_string(),
                        ServiceAddress {
                            address: "192.0.2.2".to_string(),
                            port: 443,
                        },
                    ),
                ]),
                partition: partition.clone(),
                namespace: namespace.clone(),
                ..Default::default()
            },
            // Mesh-enabled service and its sidecar proxy, which references
            // the upstream by name.
            ServiceRegistration {
                id: format!("conn-enabled-service-{suffix}"),
                service: format!("conn-enabled-service-{suffix}"),
                port: Some(12345),
                connect: Some(ConnectSettings::default()),
                partition: partition.clone(),
                namespace: namespace.clone(),
                ..Default::default()
            },
            ServiceRegistration {
                id: format!("conn-enabled-service-proxy-{suffix}"),
                service: format!("conn-enabled-service-proxy-{suffix}"),
                port: Some(21999),
                kind: Some(KIND_CONNECT_PROXY.to_string()),
                proxy: Some(SidecarProxy {
                    destination_service_name: format!("conn-enabled-service-{suffix}"),
                }),
                partition: partition.clone(),
                namespace: namespace.clone(),
                ..Default::default()
            },
        ];

        for service in registrations {
            let id = service.id.clone();
            catalog
                .register(&CatalogRegistration {
                    node: node.clone(),
                    address: SEED_NODE_ADDRESS.to_string(),
                    partition: partition.clone(),
                    service,
                })
                .await
                .map_err(|e| Error::seed(format!("failed to register {id}: {e}")))?;
        }
        debug!(%tenancy, "services registered");
        Ok(())
    }

    /// Generate the two peering establishment tokens for this tenancy's
    /// partition, issued through the default scope's client.
    pub async fn create_peerings(&self, tenancy: &Tenancy) -> Result<()> {
        let catalog = self.registry.default_clients()?.catalog()?;
        for peer in PEER_NAMES {
            catalog
                .generate_peering_token(&PeeringTokenRequest {
                    peer_name: peer.to_string(),
                    partition: tenancy.partition.clone(),
                })
                .await
                .map_err(|e| {
                    Error::seed(format!(
                        "failed to generate peering token {peer} for {}: {e}",
                        tenancy.partition
                    ))
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::clients::{CatalogApi, ClientSet};
    use crate::tenancy::TenancyKey;

    /// In-memory catalog enforcing the namespace-before-registration
    /// ordering contract.
    #[derive(Default)]
    struct StubCatalogState {
        namespaces: HashSet<(String, String)>,
        registrations: Vec<CatalogRegistration>,
        peering_tokens: Vec<(String, String)>,
    }

    #[derive(Clone, Default)]
    struct StubCatalog {
        state: Arc<Mutex<StubCatalogState>>,
    }

    #[async_trait]
    impl CatalogApi for StubCatalog {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        async fn node_name(&self) -> Result<String> {
            Ok("stub-node".into())
        }
        async fn edition(&self) -> Result<CatalogEdition> {
            Ok(CatalogEdition::Enterprise)
        }
        async fn list_partitions(&self) -> Result<Vec<String>> {
            Ok(vec!["default".into()])
        }
        async fn create_partition(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn create_namespace(&self, name: &str, partition: &str) -> Result<()> {
            self.state
                .lock()
                .unwrap()
                .namespaces
                .insert((partition.into(), name.into()));
            Ok(())
        }
        async fn register(&self, reg: &CatalogRegistration) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            let ns = &reg.service.namespace;
            if !ns.is_empty()
                && !state
                    .namespaces
                    .contains(&(reg.service.partition.clone(), ns.clone()))
            {
                return Err(Error::api("catalog", format!("namespace {ns} does not exist")));
            }
            state.registrations.push(reg.clone());
            Ok(())
        }
        async fn generate_peering_token(&self, req: &PeeringTokenRequest) -> Result<String> {
            self.state
                .lock()
                .unwrap()
                .peering_tokens
                .push((req.peer_name.clone(), req.partition.clone()));
            Ok("stub-token".into())
        }
    }

    fn registry_with(partitions: &[&str], catalog: &StubCatalog) -> Registry {
        let mut registry = Registry::new(TenancyKey::default_key());
        for p in partitions {
            let mut set = ClientSet::new();
            set.attach_catalog(Arc::new(catalog.clone()));
            registry.put(TenancyKey::new(*p), set).unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn registration_before_namespace_fails_deterministically() {
        let catalog = StubCatalog::default();
        let registry = registry_with(&["default"], &catalog);
        let seeder = ResourceSeeder::new(&registry, CatalogEdition::Enterprise, Duration::ZERO);
        let tenancy = Tenancy::new("default", "test-ns");

        // Out of order: resources before the namespace exists.
        let err = seeder
            .register_tenancy_resources(&tenancy)
            .await
            .unwrap_err();
        assert!(err.is_setup_fatal());
        assert!(err.to_string().contains("test-ns does not exist"));

        // In order it succeeds.
        seeder
            .create_namespaces(std::slice::from_ref(&tenancy))
            .await
            .unwrap();
        seeder.register_tenancy_resources(&tenancy).await.unwrap();
    }

    #[tokio::test]
    async fn seed_all_registers_the_fixed_service_set() {
        let catalog = StubCatalog::default();
        let registry = registry_with(&["default"], &catalog);
        let seeder = ResourceSeeder::new(&registry, CatalogEdition::Enterprise, Duration::ZERO);
        let tenancies = seeder.test_tenancies(&["default".into(), "test-ns".into()]);
        assert_eq!(tenancies.len(), 2);

        seeder.seed_all(&tenancies).await.unwrap();

        let state = catalog.state.lock().unwrap();
        // Four services per tenancy.
        assert_eq!(state.registrations.len(), 8);
        let ids: Vec<_> = state
            .registrations
            .iter()
            .map(|r| r.service.id.as_str())
            .collect();
        assert!(ids.contains(&"service-meta-default-default"));
        assert!(ids.contains(&"service-taggedAddresses-default-test-ns"));
        assert!(ids.contains(&"conn-enabled-service-proxy-default-test-ns"));

        // The proxy references its upstream by name.
        let proxy = state
            .registrations
            .iter()
            .find(|r| r.service.id == "conn-enabled-service-proxy-default-default")
            .unwrap();
        assert_eq!(
            proxy.service.proxy.as_ref().unwrap().destination_service_name,
            "conn-enabled-service-default-default"
        );

        // Two peering tokens per tenancy, scoped to the partition.
        assert_eq!(state.peering_tokens.len(), 4);
        assert!(state
            .peering_tokens
            .contains(&("foo".to_string(), "default".to_string())));
        assert!(state
            .peering_tokens
            .contains(&("bar".to_string(), "default".to_string())));
    }

    #[tokio::test]
    async fn community_edition_collapses_to_one_unnamespaced_tenancy() {
        let catalog = StubCatalog::default();
        let registry = registry_with(&["default"], &catalog);
        let seeder = ResourceSeeder::new(&registry, CatalogEdition::Community, Duration::ZERO);
        let tenancies = seeder.test_tenancies(&["default".into(), "test-ns".into()]);
        assert_eq!(tenancies, vec![Tenancy::unnamespaced()]);

        seeder.seed_all(&tenancies).await.unwrap();

        let state = catalog.state.lock().unwrap();
        assert_eq!(state.registrations.len(), 4);
        // Payloads omit tenancy fields the edition cannot understand.
        assert!(state.registrations.iter().all(|r| {
            r.service.partition.is_empty() && r.service.namespace.is_empty()
        }));
        // Names still carry the tenancy, with an empty namespace segment.
        assert!(state
            .registrations
            .iter()
            .any(|r| r.service.id == "service-meta-default-"));
    }

    #[tokio::test]
    async fn peerings_are_issued_through_the_default_scope() {
        let default_catalog = StubCatalog::default();
        let p1_catalog = StubCatalog::default();
        let mut registry = Registry::new(TenancyKey::default_key());
        let mut set = ClientSet::new();
        set.attach_catalog(Arc::new(default_catalog.clone()));
        registry.put(TenancyKey::default_key(), set).unwrap();
        let mut set = ClientSet::new();
        set.attach_catalog(Arc::new(p1_catalog.clone()));
        registry.put(TenancyKey::new("p1"), set).unwrap();

        let seeder = ResourceSeeder::new(&registry, CatalogEdition::Enterprise, Duration::ZERO);
        seeder
            .create_peerings(&Tenancy::new("p1", "default"))
            .await
            .unwrap();

        assert_eq!(p1_catalog.state.lock().unwrap().peering_tokens.len(), 0);
        let state = default_catalog.state.lock().unwrap();
        assert_eq!(
            state.peering_tokens,
            vec![
                ("foo".to_string(), "p1".to_string()),
                ("bar".to_string(), "p1".to_string())
            ]
        );
    }
}
