//! Harness lifecycle: setup sequencing and teardown coordination
//!
//! Setup order mirrors the dependency structure of the backends:
//!
//! 1. Scheduler agent starts first and bootstraps in the background — its
//!    readiness future resolves while the rest of setup proceeds.
//! 2. Secrets server starts.
//! 3. The default catalog instance starts; its clients form the default
//!    registry entry, and the edition and partition set are discovered
//!    from it.
//! 4. Each discovered non-default partition gets its own catalog
//!    instance, registry entry, and partition admin resource.
//! 5. Test resources are seeded per tenancy.
//! 6. Only then does setup block on the scheduler readiness future.
//!
//! Teardown runs exactly once on every exit path, including a panic in
//! the test run, and makes a best-effort pass over all resources in a
//! fixed order: secrets, scheduler, catalog instances, client sets.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::clients::{CatalogEdition, ClientFactory, ClientSet, HttpClientFactory};
use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::init::{spawn_bootstrap, BootstrapParams};
use crate::launcher::{BackendLauncher, CatalogServer, ProcessLauncher, SchedulerServer, SecretsServer};
use crate::registry::Registry;
use crate::seeder::ResourceSeeder;
use crate::tenancy::{Tenancy, TenancyKey, DEFAULT_PARTITION};

/// The live testbed: all backend handles and the per-scope client
/// registry for one run.
pub struct Harness {
    config: HarnessConfig,
    registry: Registry,
    catalog_servers: BTreeMap<TenancyKey, CatalogServer>,
    secrets: Option<SecretsServer>,
    scheduler: Option<SchedulerServer>,
    edition: CatalogEdition,
    tenancies: Vec<Tenancy>,
    stopped: bool,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("config", &self.config)
            .field("edition", &self.edition)
            .field("tenancies", &self.tenancies)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl Harness {
    /// Provision all backends with the production launcher and HTTP
    /// clients. Equivalent to [`Harness::setup`] with the defaults.
    pub async fn setup_default(config: HarnessConfig) -> Result<Self> {
        Self::setup(config, &ProcessLauncher, &HttpClientFactory).await
    }

    /// Provision all backends and seed test resources.
    ///
    /// On any setup failure the backends started so far are torn down
    /// before the error is returned; nothing is left running.
    pub async fn setup(
        config: HarnessConfig,
        launcher: &dyn BackendLauncher,
        factory: &dyn ClientFactory,
    ) -> Result<Self> {
        let mut harness = Self {
            config,
            registry: Registry::new(TenancyKey::default_key()),
            catalog_servers: BTreeMap::new(),
            secrets: None,
            scheduler: None,
            edition: CatalogEdition::Community,
            tenancies: Vec::new(),
            stopped: false,
        };
        match harness.init(launcher, factory).await {
            Ok(()) => {
                info!(scopes = harness.registry.len(), "testbed setup complete");
                Ok(harness)
            }
            Err(e) => {
                error!(error = %e, "testbed setup failed, tearing down");
                harness.stop().await;
                Err(e)
            }
        }
    }

    async fn init(
        &mut self,
        launcher: &dyn BackendLauncher,
        factory: &dyn ClientFactory,
    ) -> Result<()> {
        // Scheduler first: its bootstrap overlaps everything below.
        let scheduler_server = launcher.start_scheduler(&self.config).await?;
        let scheduler_addr = scheduler_server.addr.clone();
        self.scheduler = Some(scheduler_server);
        let scheduler_client = factory.scheduler(&scheduler_addr)?;
        let init_future = spawn_bootstrap(
            scheduler_client.clone(),
            BootstrapParams {
                job_path: self.config.canary_job_path.clone(),
                poll_interval: self.config.poll_interval,
                deadline: self.config.ready_timeout,
            },
        );

        let secrets_server = launcher.start_secrets(&self.config).await?;
        let secrets_addr = secrets_server.addr.clone();
        self.secrets = Some(secrets_server);

        // Default catalog instance; edition and partitions come from it.
        let default_key = TenancyKey::default_key();
        let catalog_server = launcher.start_catalog(&self.config, &default_key, 0).await?;
        let catalog_addr = catalog_server.addr.clone();
        self.catalog_servers.insert(default_key.clone(), catalog_server);

        let catalog_client = factory.catalog(&catalog_addr)?;
        let mut set = ClientSet::new();
        set.attach_catalog(catalog_client.clone());
        set.attach_secrets(factory.secrets(&secrets_addr, &self.config.secrets_root_token)?);
        set.attach_scheduler(scheduler_client);
        self.registry.put(default_key, set)?;

        self.edition = catalog_client.edition().await?;
        let partitions = if self.edition.is_multi_tenant() {
            catalog_client.list_partitions().await?
        } else {
            vec![DEFAULT_PARTITION.to_string()]
        };
        info!(?partitions, edition = ?self.edition, "isolation scopes discovered");

        // One catalog instance and registry entry per non-default
        // partition; the partition admin resource goes through the
        // scope's own client.
        let mut index = 1;
        for partition in &partitions {
            if partition == DEFAULT_PARTITION {
                continue;
            }
            let key = TenancyKey::new(partition.clone());
            let server = launcher.start_catalog(&self.config, &key, index).await?;
            index += 1;
            let addr = server.addr.clone();
            self.catalog_servers.insert(key.clone(), server);

            let catalog = factory.catalog(&addr)?;
            let mut set = ClientSet::new();
            set.attach_catalog(catalog.clone());
            set.attach_secrets(factory.secrets(&secrets_addr, &self.config.secrets_root_token)?);
            set.attach_scheduler(factory.scheduler(&scheduler_addr)?);
            self.registry.put(key, set)?;

            catalog.create_partition(partition).await.map_err(|e| {
                Error::seed(format!("failed to create partition {partition}: {e}"))
            })?;
        }

        // Seed while the scheduler bootstraps in the background.
        let tenancies = {
            let seeder =
                ResourceSeeder::new(&self.registry, self.edition, self.config.settle_delay);
            let tenancies = seeder.test_tenancies(&self.config.namespaces);
            seeder.seed_all(&tenancies).await?;
            tenancies
        };
        self.tenancies = tenancies;

        // The run must not start while the scheduler is initializing.
        init_future.wait(self.config.ready_timeout).await
    }

    /// The per-scope client registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The configuration this harness was built with
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// The catalog edition discovered during setup
    pub fn edition(&self) -> CatalogEdition {
        self.edition
    }

    /// The tenancies that were seeded
    pub fn tenancies(&self) -> &[Tenancy] {
        &self.tenancies
    }

    /// Execute the test run with teardown guaranteed on every exit path.
    ///
    /// A panic inside `f` is intercepted so teardown still runs, then
    /// re-raised once cleanup completes.
    pub async fn run<T>(
        mut self,
        f: impl for<'a> FnOnce(&'a Harness) -> BoxFuture<'a, T>,
    ) -> T {
        let result = std::panic::AssertUnwindSafe(f(&self)).catch_unwind().await;
        self.stop().await;
        match result {
            Ok(value) => value,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    /// Tear down every backend, once.
    ///
    /// Order: secrets, scheduler, catalog instances, client sets. Every
    /// step tolerates a handle that never started and logs its own
    /// failure without aborting the rest of the pass. Calling `stop`
    /// again is a no-op.
    pub async fn stop(&mut self) {
        if self.stopped {
            debug!("teardown already ran");
            return;
        }
        self.stopped = true;
        info!("tearing down testbed");

        if let Some(mut server) = self.secrets.take() {
            if let Err(e) = server.handle.stop().await {
                warn!(backend = "secrets", error = %e, "stop failed");
            }
        }
        if let Some(mut server) = self.scheduler.take() {
            if let Err(e) = server.handle.stop().await {
                warn!(backend = "scheduler", error = %e, "stop failed");
            }
        }
        for (key, mut server) in std::mem::take(&mut self.catalog_servers) {
            if let Err(e) = server.handle.stop().await {
                warn!(backend = "catalog", partition = %key, error = %e, "stop failed");
            }
        }
        for (_, mut set) in self.registry.drain() {
            set.stop();
        }
    }

    /// Mount a key/value secrets engine for this run and remember its
    /// path for [`Harness::create_secret`] / [`Harness::delete_secret`].
    pub async fn mount_secrets(&mut self, path: &str, version: &str) -> Result<()> {
        self.registry
            .default_clients()?
            .secrets()?
            .mount_kv(path, version)
            .await
            .inspect_err(|e| warn!(path, error = %e, "secrets mount failed"))?;
        if let Some(server) = self.secrets.as_mut() {
            server.mount_path = Some(path.to_string());
        }
        Ok(())
    }

    /// Write a secret under the mounted engine. Fixture-operation tier:
    /// failures are logged and returned, the run continues.
    pub async fn create_secret(&self, path: &str, data: &serde_json::Value) -> Result<()> {
        let mount = self.mount_path()?;
        self.registry
            .default_clients()?
            .secrets()?
            .write_secret(&format!("{mount}/{path}"), data)
            .await
            .inspect_err(|e| warn!(path, error = %e, "secret write failed"))
    }

    /// Delete a secret under the mounted engine
    pub async fn delete_secret(&self, path: &str) -> Result<()> {
        let mount = self.mount_path()?;
        self.registry
            .default_clients()?
            .secrets()?
            .delete_secret(&format!("{mount}/{path}"))
            .await
            .inspect_err(|e| warn!(path, error = %e, "secret delete failed"))
    }

    /// Create or update a scheduler variable
    pub async fn create_scheduler_variable(
        &self,
        path: &str,
        items: &std::collections::BTreeMap<String, String>,
    ) -> Result<()> {
        self.registry
            .default_clients()?
            .scheduler()?
            .upsert_variable(path, items)
            .await
            .inspect_err(|e| warn!(path, error = %e, "variable upsert failed"))
    }

    /// Delete a scheduler variable
    pub async fn delete_scheduler_variable(&self, path: &str) -> Result<()> {
        self.registry
            .default_clients()?
            .scheduler()?
            .delete_variable(path)
            .await
            .inspect_err(|e| warn!(path, error = %e, "variable delete failed"))
    }

    /// Register a scheduler namespace
    pub async fn create_scheduler_namespace(&self, name: &str) -> Result<()> {
        self.registry
            .default_clients()?
            .scheduler()?
            .create_namespace(name)
            .await
            .inspect_err(|e| warn!(name, error = %e, "namespace create failed"))
    }

    fn mount_path(&self) -> Result<&str> {
        self.secrets
            .as_ref()
            .and_then(|s| s.mount_path.as_deref())
            .ok_or(Error::ClientUnavailable("secrets mount"))
    }
}
