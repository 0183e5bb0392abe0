//! Error types for the testbed orchestrator

use std::time::Duration;

use thiserror::Error;

/// Main error type for testbed operations.
///
/// Errors fall into two tiers. Setup-fatal errors (`PrerequisiteNotFound`,
/// `Spawn`, `Fixture`, `ReadyTimeout`, `Bootstrap`, `Seed`,
/// `DuplicateTenancy`) abort the whole run; teardown still executes before
/// the process reports failure. Everything else is a fixture-operation
/// error: callers log it and carry on.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A required backend executable was not found on `$PATH`
    #[error("prerequisite not found: {tool} - {hint}")]
    PrerequisiteNotFound {
        /// The executable that was not found
        tool: String,
        /// Hint for how to install it
        hint: String,
    },

    /// A backend process failed to spawn
    #[error("{backend} failed to start: {source}")]
    Spawn {
        /// Which backend was being started
        backend: String,
        /// The underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// The canary job fixture could not be read or parsed
    #[error("fixture error: {0}")]
    Fixture(String),

    /// A backend did not become ready before its deadline
    #[error("{backend} not ready after {elapsed:?}")]
    ReadyTimeout {
        /// Which backend timed out
        backend: String,
        /// How long we waited
        elapsed: Duration,
    },

    /// The scheduler bootstrap protocol failed
    #[error("scheduler bootstrap failed: {0}")]
    Bootstrap(String),

    /// Resource seeding failed
    #[error("seed error: {0}")]
    Seed(String),

    /// A registry entry already exists for this partition
    #[error("duplicate tenancy: partition {0:?} already registered")]
    DuplicateTenancy(String),

    /// A client handle was requested from a stopped or partial ClientSet
    #[error("{0} client unavailable")]
    ClientUnavailable(&'static str),

    /// A backend API call was rejected
    #[error("{backend} API error: {message}")]
    Api {
        /// Which backend rejected the call
        backend: &'static str,
        /// The rejection message
        message: String,
    },

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a bootstrap error with the given message
    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::Bootstrap(msg.into())
    }

    /// Create a seed error with the given message
    pub fn seed(msg: impl Into<String>) -> Self {
        Self::Seed(msg.into())
    }

    /// Create a fixture error with the given message
    pub fn fixture(msg: impl Into<String>) -> Self {
        Self::Fixture(msg.into())
    }

    /// Create an API rejection error for the given backend
    pub fn api(backend: &'static str, msg: impl Into<String>) -> Self {
        Self::Api {
            backend,
            message: msg.into(),
        }
    }

    /// Whether this error aborts setup (as opposed to a fixture-operation
    /// error that is logged and returned).
    pub fn is_setup_fatal(&self) -> bool {
        matches!(
            self,
            Self::PrerequisiteNotFound { .. }
                | Self::Spawn { .. }
                | Self::Fixture(_)
                | Self::ReadyTimeout { .. }
                | Self::Bootstrap(_)
                | Self::Seed(_)
                | Self::DuplicateTenancy(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_fatal_tier_covers_provisioning_failures() {
        assert!(Error::PrerequisiteNotFound {
            tool: "scheduler".into(),
            hint: "install it".into(),
        }
        .is_setup_fatal());
        assert!(Error::fixture("missing canary job").is_setup_fatal());
        assert!(Error::ReadyTimeout {
            backend: "catalog".into(),
            elapsed: Duration::from_secs(30),
        }
        .is_setup_fatal());
        assert!(Error::bootstrap("expected 1 allocation but found 2").is_setup_fatal());
        assert!(Error::seed("namespace rejected").is_setup_fatal());
    }

    #[test]
    fn fixture_operation_tier_does_not_abort() {
        assert!(!Error::api("secrets", "permission denied").is_setup_fatal());
        assert!(!Error::ClientUnavailable("catalog").is_setup_fatal());
    }

    #[test]
    fn messages_name_the_failing_backend() {
        let err = Error::ReadyTimeout {
            backend: "scheduler".into(),
            elapsed: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("scheduler"));

        let err = Error::api("catalog", "register rejected");
        assert!(err.to_string().contains("catalog"));
        assert!(err.to_string().contains("register rejected"));
    }
}
