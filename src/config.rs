//! Harness configuration
//!
//! One explicit config struct with defaults matching the development-mode
//! flags the backends are spawned with. Tests shorten the timeouts; real
//! runs use the defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one harness run
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    /// Secrets backend executable, resolved via `$PATH`
    pub secrets_bin: String,
    /// Scheduler backend executable, resolved via `$PATH`
    pub scheduler_bin: String,
    /// Catalog backend executable, resolved via `$PATH`
    pub catalog_bin: String,

    /// Address the dev-mode secrets server listens on
    pub secrets_addr: String,
    /// Fixed root credential for the dev-mode secrets server
    pub secrets_root_token: String,
    /// Address the dev-mode scheduler listens on
    pub scheduler_addr: String,
    /// First HTTP port for spawned catalog instances; each additional
    /// isolation scope takes the next port block
    pub catalog_base_port: u16,

    /// Path to the canary job JSON fixture
    pub canary_job_path: PathBuf,

    /// Deadline for the scheduler readiness protocol and for waiting on
    /// the init future
    pub ready_timeout: Duration,
    /// Interval between readiness polls
    pub poll_interval: Duration,
    /// Deadline for each catalog instance to elect a leader
    pub catalog_ready_timeout: Duration,
    /// Pause after seeding each tenancy, letting registrations propagate
    pub settle_delay: Duration,

    /// Namespaces crossed with discovered partitions to form the test
    /// tenancies (multi-tenant editions only)
    pub namespaces: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            secrets_bin: "vault".to_string(),
            scheduler_bin: "nomad".to_string(),
            catalog_bin: "consul".to_string(),
            secrets_addr: "http://127.0.0.1:8200".to_string(),
            secrets_root_token: "a_token".to_string(),
            scheduler_addr: "http://127.0.0.1:4646".to_string(),
            catalog_base_port: 18500,
            canary_job_path: PathBuf::from("testdata/canary.json"),
            ready_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            catalog_ready_timeout: Duration::from_secs(2),
            settle_delay: Duration::from_secs(2),
            namespaces: vec!["default".to_string(), "test-ns".to_string()],
        }
    }
}
