//! Scheduler readiness: single-shot init future and bootstrap protocol
//!
//! The scheduler is the one backend whose initialization overlaps the rest
//! of setup. Starting it hands back an [`InitFuture`] immediately; a
//! background task works through the bootstrap protocol (load the canary
//! job, wait for the API, submit, wait for a running allocation) and
//! resolves the future exactly once. The main sequence seeds catalog
//! resources in the meantime and blocks on the future only at the end.
//!
//! All polling runs at a fixed short interval under an absolute deadline;
//! deadline expiry turns "not ready yet" into a terminal setup error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info};

use crate::clients::{JobSpec, SchedulerApi, ALLOC_STATUS_RUNNING};
use crate::error::{Error, Result};

/// Producer side of the completion signal, resolved exactly once
pub struct InitHandle {
    tx: oneshot::Sender<Result<()>>,
}

impl InitHandle {
    /// Resolve the future with success or a descriptive error. Consumes
    /// the handle; there is no second resolution.
    pub fn resolve(self, result: Result<()>) {
        // The consumer may have given up already; nothing to do then.
        let _ = self.tx.send(result);
    }
}

/// Consumer side: the pending "scheduler is ready" signal
pub struct InitFuture {
    rx: oneshot::Receiver<Result<()>>,
}

impl InitFuture {
    /// Block until the background task resolves, or the deadline passes
    pub async fn wait(self, deadline: Duration) -> Result<()> {
        match timeout(deadline, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::bootstrap(
                "bootstrap task exited without resolving".to_string(),
            )),
            Err(_) => Err(Error::ReadyTimeout {
                backend: "scheduler".to_string(),
                elapsed: deadline,
            }),
        }
    }
}

/// Create a connected handle/future pair
pub fn init_pair() -> (InitHandle, InitFuture) {
    let (tx, rx) = oneshot::channel();
    (InitHandle { tx }, InitFuture { rx })
}

/// Parameters for the bootstrap protocol
#[derive(Clone, Debug)]
pub struct BootstrapParams {
    /// Canary job fixture location
    pub job_path: PathBuf,
    /// Interval between polls
    pub poll_interval: Duration,
    /// Absolute deadline for each readiness phase
    pub deadline: Duration,
}

/// Spawn the background bootstrap task and return the future it resolves
pub fn spawn_bootstrap(client: Arc<dyn SchedulerApi>, params: BootstrapParams) -> InitFuture {
    let (handle, future) = init_pair();
    tokio::spawn(async move {
        handle.resolve(bootstrap(client.as_ref(), &params).await);
    });
    future
}

/// Run the bootstrap protocol to completion.
///
/// More than one allocation for the canary job is a fixture bug, not a
/// transient condition, and fails immediately without further polling.
/// Zero allocations or a non-running status keep polling to the deadline.
pub async fn bootstrap(client: &dyn SchedulerApi, params: &BootstrapParams) -> Result<()> {
    let raw = tokio::fs::read_to_string(&params.job_path)
        .await
        .map_err(|e| {
            Error::fixture(format!(
                "error opening test job {}: {e}",
                params.job_path.display()
            ))
        })?;
    let job = JobSpec::from_json(&raw)?;

    // Wait for the API to become available.
    let start = Instant::now();
    loop {
        match client.ping().await {
            Ok(version) => {
                info!(version = version.as_deref().unwrap_or("unknown"), "scheduler api up");
                break;
            }
            Err(e) => {
                if start.elapsed() >= params.deadline {
                    return Err(Error::bootstrap(format!(
                        "failed to contact scheduler agent: {e}"
                    )));
                }
                sleep(params.poll_interval).await;
            }
        }
    }

    client
        .register_job(&job)
        .await
        .map_err(|e| Error::bootstrap(format!("failed registering canary job: {e}")))?;

    // Wait for exactly one running allocation.
    let start = Instant::now();
    let mut last = String::from("no allocations observed");
    loop {
        match client.job_allocations(&job.id).await {
            Err(e) => last = format!("allocation list failed: {e}"),
            Ok(allocs) if allocs.len() > 1 => {
                return Err(Error::bootstrap(format!(
                    "expected 1 allocation but found {}\n{}\n{}",
                    allocs.len(),
                    allocs[0].compile_task_states(),
                    allocs[1].compile_task_states(),
                )));
            }
            Ok(allocs) => match allocs.first() {
                None => last = "expected 1 allocation but found none".to_string(),
                Some(alloc) if alloc.client_status == ALLOC_STATUS_RUNNING => {
                    info!(alloc = %alloc.id, states = %alloc.compile_task_states(), "canary running");
                    return Ok(());
                }
                Some(alloc) => {
                    last = format!(
                        "expected allocation running but found {:?}\n{}",
                        alloc.client_status,
                        alloc.compile_task_states(),
                    );
                }
            },
        }
        if start.elapsed() >= params.deadline {
            return Err(Error::bootstrap(format!(
                "canary job not running after {:?}: {last}",
                params.deadline
            )));
        }
        debug!(%last, "canary not ready yet");
        sleep(params.poll_interval).await;
    }
}
