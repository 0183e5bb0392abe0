//! Scheduler backend client: jobs, allocations, variables, namespaces
//!
//! The canary bootstrap protocol in [`crate::init`] drives this interface;
//! variables and namespaces are fixture helpers for individual tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A job description, parsed from the canary fixture document.
///
/// Only the id is interpreted; everything else passes through to the
/// backend untouched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobSpec {
    /// Job identifier, used to look up allocations after submission
    #[serde(rename = "ID")]
    pub id: String,
    /// Remaining job fields, forwarded verbatim
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl JobSpec {
    /// Parse a job description from a JSON fixture document
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::fixture(format!("error parsing test job: {e}")))
    }
}

/// One event in a task's lifecycle
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Event type, e.g. "Received", "Driver", "Started"
    #[serde(rename = "Type")]
    pub event_type: String,
}

/// Lifecycle state of one task inside an allocation
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskState {
    /// Events recorded for this task, oldest first
    #[serde(rename = "Events", default)]
    pub events: Vec<TaskEvent>,
}

/// Client status an allocation reports once its tasks run
pub const ALLOC_STATUS_RUNNING: &str = "running";

/// Summary of one allocation of a job
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AllocationStub {
    /// Allocation id
    #[serde(rename = "ID", default)]
    pub id: String,
    /// Client-side status: "pending", "running", "failed", ...
    #[serde(rename = "ClientStatus", default)]
    pub client_status: String,
    /// Per-task lifecycle states
    #[serde(rename = "TaskStates", default)]
    pub task_states: BTreeMap<String, TaskState>,
}

impl AllocationStub {
    /// Render task states as `task: [Event1, Event2] ...` for diagnostics
    pub fn compile_task_states(&self) -> String {
        let mut out = String::new();
        for (name, state) in &self.task_states {
            out.push_str(name);
            out.push_str(": [");
            for (i, event) in state.events.iter().enumerate() {
                out.push_str(&event.event_type);
                if i != state.events.len() - 1 {
                    out.push_str(", ");
                }
            }
            out.push_str("] ");
        }
        out
    }
}

/// Narrow interface to the scheduler backend
#[async_trait]
pub trait SchedulerApi: Send + Sync {
    /// Smoke check: the agent answers its self-identification endpoint.
    /// Returns the backend's build version when it reports one.
    async fn ping(&self) -> Result<Option<String>>;

    /// Submit a job for scheduling
    async fn register_job(&self, job: &JobSpec) -> Result<()>;

    /// List all allocations (including stopped ones) for a job
    async fn job_allocations(&self, job_id: &str) -> Result<Vec<AllocationStub>>;

    /// Create or update a variable at the given path
    async fn upsert_variable(&self, path: &str, items: &BTreeMap<String, String>) -> Result<()>;

    /// Delete a variable
    async fn delete_variable(&self, path: &str) -> Result<()>;

    /// Register a namespace
    async fn create_namespace(&self, name: &str) -> Result<()>;
}

/// HTTP implementation of [`SchedulerApi`]
pub struct HttpSchedulerClient {
    http: reqwest::Client,
    base: String,
}

impl HttpSchedulerClient {
    /// Connect to the scheduler HTTP API at the given base address
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base: addr.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

#[async_trait]
impl SchedulerApi for HttpSchedulerClient {
    async fn ping(&self) -> Result<Option<String>> {
        let resp = self
            .http
            .get(self.url("/v1/agent/self"))
            .send()
            .await?
            .error_for_status()?;
        let info: serde_json::Value = resp.json().await?;
        Ok(info["member"]["Tags"]["build"].as_str().map(str::to_owned))
    }

    async fn register_job(&self, job: &JobSpec) -> Result<()> {
        self.http
            .post(self.url("/v1/jobs"))
            .json(&serde_json::json!({ "Job": job }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn job_allocations(&self, job_id: &str) -> Result<Vec<AllocationStub>> {
        let resp = self
            .http
            .get(self.url(&format!("/v1/job/{job_id}/allocations")))
            .query(&[("all", "true")])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn upsert_variable(&self, path: &str, items: &BTreeMap<String, String>) -> Result<()> {
        self.http
            .put(self.url(&format!("/v1/var/{path}")))
            .json(&serde_json::json!({ "Path": path, "Items": items }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_variable(&self, path: &str) -> Result<()> {
        self.http
            .delete(self.url(&format!("/v1/var/{path}")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        self.http
            .post(self.url("/v1/namespace"))
            .json(&serde_json::json!({ "Name": name }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
