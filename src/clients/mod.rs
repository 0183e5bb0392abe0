//! Backend client interfaces and the per-scope client bundle
//!
//! Each backend is consumed through a narrow trait ([`CatalogApi`],
//! [`SecretsApi`], [`SchedulerApi`]); the HTTP implementations live in the
//! per-backend submodules and tests substitute in-memory stubs. A
//! [`ClientSet`] bundles one connection per backend for one isolation
//! scope and is owned exclusively by its registry entry.

mod catalog;
mod scheduler;
mod secrets;

use std::sync::Arc;

pub use catalog::{
    CatalogApi, CatalogEdition, CatalogRegistration, ConnectSettings, HttpCatalogClient,
    PeeringTokenRequest, ServiceAddress, ServiceRegistration, SidecarProxy, KIND_CONNECT_PROXY,
};
pub use scheduler::{
    AllocationStub, HttpSchedulerClient, JobSpec, SchedulerApi, TaskEvent, TaskState,
    ALLOC_STATUS_RUNNING,
};
pub use secrets::{HttpSecretsClient, SecretsApi};

use crate::error::{Error, Result};

/// Constructs backend clients for given addresses.
///
/// Seam between the orchestrator and the wire-level clients: production
/// uses [`HttpClientFactory`]; tests hand out stubs.
pub trait ClientFactory: Send + Sync {
    /// Build a catalog client for the instance at `addr`
    fn catalog(&self, addr: &str) -> Result<Arc<dyn CatalogApi>>;

    /// Build a secrets client authenticated with `token`
    fn secrets(&self, addr: &str, token: &str) -> Result<Arc<dyn SecretsApi>>;

    /// Build a scheduler client
    fn scheduler(&self, addr: &str) -> Result<Arc<dyn SchedulerApi>>;
}

/// Production [`ClientFactory`] backed by the HTTP clients
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn catalog(&self, addr: &str) -> Result<Arc<dyn CatalogApi>> {
        Ok(Arc::new(HttpCatalogClient::new(addr)?))
    }

    fn secrets(&self, addr: &str, token: &str) -> Result<Arc<dyn SecretsApi>> {
        Ok(Arc::new(HttpSecretsClient::new(addr, token)?))
    }

    fn scheduler(&self, addr: &str) -> Result<Arc<dyn SchedulerApi>> {
        Ok(Arc::new(HttpSchedulerClient::new(addr)?))
    }
}

/// Live connections to all three backends for one isolation scope.
///
/// Fields are optional so that `stop` is safe on a partially-initialized
/// set: a setup failure between client creations still tears down cleanly.
#[derive(Default)]
pub struct ClientSet {
    catalog: Option<Arc<dyn CatalogApi>>,
    secrets: Option<Arc<dyn SecretsApi>>,
    scheduler: Option<Arc<dyn SchedulerApi>>,
}

impl ClientSet {
    /// Create an empty set; connections are attached as setup progresses
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the catalog connection
    pub fn attach_catalog(&mut self, client: Arc<dyn CatalogApi>) {
        self.catalog = Some(client);
    }

    /// Attach the secrets connection
    pub fn attach_secrets(&mut self, client: Arc<dyn SecretsApi>) {
        self.secrets = Some(client);
    }

    /// Attach the scheduler connection
    pub fn attach_scheduler(&mut self, client: Arc<dyn SchedulerApi>) {
        self.scheduler = Some(client);
    }

    /// The catalog connection, if attached and not stopped
    pub fn catalog(&self) -> Result<Arc<dyn CatalogApi>> {
        self.catalog
            .clone()
            .ok_or(Error::ClientUnavailable("catalog"))
    }

    /// The secrets connection, if attached and not stopped
    pub fn secrets(&self) -> Result<Arc<dyn SecretsApi>> {
        self.secrets
            .clone()
            .ok_or(Error::ClientUnavailable("secrets"))
    }

    /// The scheduler connection, if attached and not stopped
    pub fn scheduler(&self) -> Result<Arc<dyn SchedulerApi>> {
        self.scheduler
            .clone()
            .ok_or(Error::ClientUnavailable("scheduler"))
    }

    /// Release all connections. Safe on a partially-initialized set and
    /// safe to call more than once.
    pub fn stop(&mut self) {
        self.catalog = None;
        self.secrets = None;
        self.scheduler = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullCatalog;

    #[async_trait]
    impl CatalogApi for NullCatalog {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        async fn node_name(&self) -> Result<String> {
            Ok("node".into())
        }
        async fn edition(&self) -> Result<CatalogEdition> {
            Ok(CatalogEdition::Community)
        }
        async fn list_partitions(&self) -> Result<Vec<String>> {
            Ok(vec!["default".into()])
        }
        async fn create_partition(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn create_namespace(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn register(&self, _: &CatalogRegistration) -> Result<()> {
            Ok(())
        }
        async fn generate_peering_token(&self, _: &PeeringTokenRequest) -> Result<String> {
            Ok("token".into())
        }
    }

    #[test]
    fn partial_set_reports_missing_clients() {
        let mut set = ClientSet::new();
        assert!(matches!(
            set.catalog(),
            Err(Error::ClientUnavailable("catalog"))
        ));
        set.attach_catalog(Arc::new(NullCatalog));
        assert!(set.catalog().is_ok());
        assert!(matches!(
            set.secrets(),
            Err(Error::ClientUnavailable("secrets"))
        ));
    }

    #[test]
    fn stop_is_idempotent_and_releases_all() {
        let mut set = ClientSet::new();
        set.attach_catalog(Arc::new(NullCatalog));
        set.stop();
        assert!(set.catalog().is_err());
        // Second stop on an already-drained set is a no-op.
        set.stop();
    }
}
