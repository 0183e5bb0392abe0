//! Backend process launching
//!
//! Starts each backend as a managed external process in development mode,
//! with output streams discarded. A missing executable or failed spawn is
//! fatal to the whole run: these backends are foundational and have no
//! degraded mode. [`BackendLauncher`] is the seam tests use to substitute
//! stub servers.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::clients::{CatalogApi, HttpCatalogClient};
use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::tenancy::TenancyKey;

/// A stoppable backend server, managed process or not.
///
/// `stop` must tolerate a handle that was never started and repeated
/// calls; the second and later calls are no-ops.
#[async_trait]
pub trait ServerHandle: Send {
    /// Terminate the server and wait for it to exit
    async fn stop(&mut self) -> Result<()>;
}

/// [`ServerHandle`] owning a spawned child process
pub struct ProcessHandle {
    backend: String,
    child: Option<Child>,
}

impl ProcessHandle {
    /// Wrap a spawned child
    pub fn new(backend: impl Into<String>, child: Child) -> Self {
        Self {
            backend: backend.into(),
            child: Some(child),
        }
    }

    /// A handle with no process behind it; `stop` is a no-op
    pub fn unstarted(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            child: None,
        }
    }
}

#[async_trait]
impl ServerHandle for ProcessHandle {
    async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            debug!(backend = %self.backend, "no process to stop");
            return Ok(());
        };
        info!(backend = %self.backend, "stopping");
        // An already-exited child makes start_kill fail; wait still
        // reaps it below.
        let _ = child.start_kill();
        child.wait().await?;
        Ok(())
    }
}

/// Handle for the secrets backend plus its mount metadata
pub struct SecretsServer {
    /// Process handle
    pub handle: Box<dyn ServerHandle>,
    /// HTTP address the server listens on
    pub addr: String,
    /// Path of the secrets mount created for this run, once mounted
    pub mount_path: Option<String>,
}

/// Handle for the scheduler backend
pub struct SchedulerServer {
    /// Process handle
    pub handle: Box<dyn ServerHandle>,
    /// HTTP address the agent listens on
    pub addr: String,
}

/// Handle for one catalog backend instance
pub struct CatalogServer {
    /// Process handle
    pub handle: Box<dyn ServerHandle>,
    /// HTTP address of this instance
    pub addr: String,
    /// Datacenter identity; non-default partitions run as separate
    /// logical clusters
    pub datacenter: String,
}

/// Starts backend servers. Production spawns processes; tests stub this.
#[async_trait]
pub trait BackendLauncher: Send + Sync {
    /// Start the secrets backend in dev mode with a fixed root credential
    async fn start_secrets(&self, cfg: &HarnessConfig) -> Result<SecretsServer>;

    /// Start the scheduler backend agent in dev mode
    async fn start_scheduler(&self, cfg: &HarnessConfig) -> Result<SchedulerServer>;

    /// Start one catalog instance for the given isolation scope. `index`
    /// selects the port block so instances do not collide.
    async fn start_catalog(
        &self,
        cfg: &HarnessConfig,
        key: &TenancyKey,
        index: usize,
    ) -> Result<CatalogServer>;
}

/// Production launcher spawning real processes
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    /// Verify an executable exists on `$PATH`
    async fn check_tool(&self, tool: &str) -> Result<()> {
        let found = Command::new("which")
            .arg(tool)
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false);
        if !found {
            return Err(Error::PrerequisiteNotFound {
                tool: tool.to_string(),
                hint: format!("install the {tool} binary and add it to $PATH"),
            });
        }
        Ok(())
    }

    fn spawn(&self, backend: &str, bin: &str, args: &[String]) -> Result<Child> {
        debug!(backend, bin, ?args, "spawning");
        Command::new(bin)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                backend: backend.to_string(),
                source,
            })
    }
}

#[async_trait]
impl BackendLauncher for ProcessLauncher {
    async fn start_secrets(&self, cfg: &HarnessConfig) -> Result<SecretsServer> {
        self.check_tool(&cfg.secrets_bin).await?;
        let args = vec![
            "server".to_string(),
            "-dev".to_string(),
            "-dev-root-token-id".to_string(),
            cfg.secrets_root_token.clone(),
            "-dev-no-store-token".to_string(),
        ];
        let child = self.spawn("secrets", &cfg.secrets_bin, &args)?;
        info!(addr = %cfg.secrets_addr, "secrets server started");
        Ok(SecretsServer {
            handle: Box::new(ProcessHandle::new("secrets", child)),
            addr: cfg.secrets_addr.clone(),
            mount_path: None,
        })
    }

    async fn start_scheduler(&self, cfg: &HarnessConfig) -> Result<SchedulerServer> {
        self.check_tool(&cfg.scheduler_bin).await?;
        let args = vec![
            "agent".to_string(),
            "-dev".to_string(),
            "-node=test".to_string(),
            "-vault-enabled=false".to_string(),
            "-consul-auto-advertise=false".to_string(),
            "-consul-client-auto-join=false".to_string(),
            "-consul-server-auto-join=false".to_string(),
            "-network-speed=100".to_string(),
            // Output is discarded anyway
            "-log-level=error".to_string(),
        ];
        let child = self.spawn("scheduler", &cfg.scheduler_bin, &args)?;
        info!(addr = %cfg.scheduler_addr, "scheduler agent started");
        Ok(SchedulerServer {
            handle: Box::new(ProcessHandle::new("scheduler", child)),
            addr: cfg.scheduler_addr.clone(),
        })
    }

    async fn start_catalog(
        &self,
        cfg: &HarnessConfig,
        key: &TenancyKey,
        index: usize,
    ) -> Result<CatalogServer> {
        self.check_tool(&cfg.catalog_bin).await?;

        // Non-default partitions run as logically separate clusters.
        let datacenter = if key.is_default() {
            "dc1".to_string()
        } else {
            key.partition.clone()
        };
        let node_name = format!("testbed-{}", key.partition);
        let ports = CatalogPorts::block(cfg.catalog_base_port, index);
        let addr = format!("http://127.0.0.1:{}", ports.http);

        let args = vec![
            "agent".to_string(),
            "-dev".to_string(),
            "-node".to_string(),
            node_name,
            "-datacenter".to_string(),
            datacenter.clone(),
            "-log-level".to_string(),
            "warn".to_string(),
            "-http-port".to_string(),
            ports.http.to_string(),
            "-dns-port".to_string(),
            ports.dns.to_string(),
            "-server-port".to_string(),
            ports.server.to_string(),
            "-grpc-port".to_string(),
            ports.grpc.to_string(),
            "-serf-lan-port".to_string(),
            ports.serf_lan.to_string(),
            "-serf-wan-port".to_string(),
            ports.serf_wan.to_string(),
        ];
        let child = self.spawn("catalog", &cfg.catalog_bin, &args)?;
        let mut handle = ProcessHandle::new(format!("catalog:{}", key.partition), child);

        // Instance must elect a leader within its readiness window.
        let probe = HttpCatalogClient::new(addr.clone())?;
        let start = Instant::now();
        loop {
            match probe.ping().await {
                Ok(()) => break,
                Err(e) if start.elapsed() < cfg.catalog_ready_timeout => {
                    debug!(partition = %key.partition, error = %e, "catalog not ready yet");
                    sleep(cfg.poll_interval).await;
                }
                Err(_) => {
                    if let Err(e) = handle.stop().await {
                        warn!(partition = %key.partition, error = %e, "failed to stop unready catalog");
                    }
                    return Err(Error::ReadyTimeout {
                        backend: format!("catalog:{}", key.partition),
                        elapsed: start.elapsed(),
                    });
                }
            }
        }

        info!(partition = %key.partition, %addr, dc = %datacenter, "catalog instance ready");
        Ok(CatalogServer {
            handle: Box::new(handle),
            addr,
            datacenter,
        })
    }
}

/// Port block for one catalog instance
struct CatalogPorts {
    http: u16,
    dns: u16,
    server: u16,
    grpc: u16,
    serf_lan: u16,
    serf_wan: u16,
}

impl CatalogPorts {
    /// Ten consecutive ports per instance, starting at `base`
    fn block(base: u16, index: usize) -> Self {
        let first = base + (index as u16) * 10;
        Self {
            http: first,
            dns: first + 1,
            server: first + 2,
            grpc: first + 3,
            serf_lan: first + 4,
            serf_wan: first + 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unstarted_handle_stop_is_a_noop() {
        let mut handle = ProcessHandle::unstarted("secrets");
        handle.stop().await.unwrap();
        // And again: still a no-op.
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_reaps_a_spawned_process() {
        let child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut handle = ProcessHandle::new("test", child);
        handle.stop().await.unwrap();
        // Process is gone; a second stop has nothing to do.
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn missing_binary_is_prerequisite_error() {
        let launcher = ProcessLauncher;
        let err = launcher
            .check_tool("definitely-not-a-real-binary-name")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PrerequisiteNotFound { .. }));
        assert!(err.is_setup_fatal());
    }

    #[test]
    fn port_blocks_do_not_overlap() {
        let a = CatalogPorts::block(18500, 0);
        let b = CatalogPorts::block(18500, 1);
        assert_eq!(a.http, 18500);
        assert_eq!(b.http, 18510);
        assert!(a.serf_wan < b.http);
    }
}
