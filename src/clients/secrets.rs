//! Secrets backend client: mounts and secret read/write/delete
//!
//! Calls here (other than the readiness ping) are fixture-operation tier:
//! failures are reported to the caller and never abort the run.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Narrow interface to the secrets backend
#[async_trait]
pub trait SecretsApi: Send + Sync {
    /// Smoke check: the dev server answers its health endpoint
    async fn ping(&self) -> Result<()>;

    /// Mount a key/value secrets engine at the given path
    async fn mount_kv(&self, path: &str, version: &str) -> Result<()>;

    /// Write a secret under a mount-relative path
    async fn write_secret(&self, path: &str, data: &Value) -> Result<()>;

    /// Read a secret back; returns the data payload
    async fn read_secret(&self, path: &str) -> Result<Value>;

    /// Delete a secret
    async fn delete_secret(&self, path: &str) -> Result<()>;
}

/// HTTP implementation of [`SecretsApi`] using token auth
pub struct HttpSecretsClient {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl HttpSecretsClient {
    /// Connect to the secrets HTTP API with the given root token
    pub fn new(addr: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base: addr.into(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl SecretsApi for HttpSecretsClient {
    async fn ping(&self) -> Result<()> {
        self.http
            .get(self.url("sys/health"))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn mount_kv(&self, path: &str, version: &str) -> Result<()> {
        self.http
            .post(self.url(&format!("sys/mounts/{path}")))
            .header("X-Vault-Token", &self.token)
            .json(&serde_json::json!({
                "type": "kv",
                "description": "test mount",
                "options": { "version": version },
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn write_secret(&self, path: &str, data: &Value) -> Result<()> {
        self.http
            .post(self.url(path))
            .header("X-Vault-Token", &self.token)
            .json(data)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn read_secret(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .header("X-Vault-Token", &self.token)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = resp.json().await?;
        Ok(body["data"].clone())
    }

    async fn delete_secret(&self, path: &str) -> Result<()> {
        self.http
            .delete(self.url(path))
            .header("X-Vault-Token", &self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_rooted_under_v1() {
        let c = HttpSecretsClient::new("http://127.0.0.1:8200", "a_token").unwrap();
        assert_eq!(c.url("sys/health"), "http://127.0.0.1:8200/v1/sys/health");
        assert_eq!(c.url("/secret/foo"), "http://127.0.0.1:8200/v1/secret/foo");
    }
}
