//! Testbed - live-backend fixture orchestration for integration suites
//!
//! Testbed provisions, configures, and tears down the three external
//! services an integration suite runs against: a key/value +
//! service-catalog cluster, a secrets engine, and a job scheduler. Tests
//! get live instances instead of mocks; the harness owns the full
//! lifecycle for exactly one run per process.
//!
//! # Lifecycle
//!
//! - [`Harness::setup`] spawns the backends, discovers isolation scopes,
//!   populates the [`registry::Registry`], and seeds test resources. The
//!   scheduler bootstraps concurrently in the background; setup blocks on
//!   its readiness future last.
//! - [`Harness::run`] executes the test run and guarantees teardown on
//!   every exit path, panics included.
//!
//! # Modules
//!
//! - [`tenancy`] - Isolation scope model (partitions, namespaces)
//! - [`registry`] - Per-scope client registry
//! - [`clients`] - Narrow backend interfaces and HTTP implementations
//! - [`launcher`] - Backend process spawning and handles
//! - [`init`] - Scheduler readiness future and bootstrap protocol
//! - [`seeder`] - Ordered seeding of cross-cutting test resources
//! - [`harness`] - Setup sequencing and teardown coordination
//! - [`config`] - Harness configuration
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod clients;
pub mod config;
pub mod error;
pub mod harness;
pub mod init;
pub mod launcher;
pub mod registry;
pub mod seeder;
pub mod tenancy;

pub use config::HarnessConfig;
pub use error::{Error, Result};
pub use harness::Harness;
