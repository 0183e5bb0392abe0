//! Catalog backend client: registration, tenancy administration, peering
//!
//! The wire protocol belongs to the backend; this module only defines the
//! narrow surface the orchestrator consumes, plus an HTTP implementation of
//! it. Registration payloads are explicit records rather than dynamic maps
//! so that a typo in a field name fails at compile time, not silently on
//! the wire.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Whether the catalog backend supports partition/namespace administration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogEdition {
    /// Single-tenant build: no partitions or namespaces
    Community,
    /// Multi-tenant build: partitions and namespaces available
    Enterprise,
}

impl CatalogEdition {
    /// Whether partitions and namespaces can be administered
    pub fn is_multi_tenant(self) -> bool {
        matches!(self, Self::Enterprise)
    }
}

/// A network address a service exposes under a named tag (e.g. lan/wan)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAddress {
    /// The address for this tag
    #[serde(rename = "Address")]
    pub address: String,
    /// The port for this tag
    #[serde(rename = "Port")]
    pub port: u16,
}

/// Sidecar proxy configuration referencing the upstream service by name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarProxy {
    /// Name of the service this proxy fronts
    #[serde(rename = "DestinationServiceName")]
    pub destination_service_name: String,
}

/// Marker enabling mesh connectivity on a service registration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectSettings {}

/// One service entry inside a catalog registration.
///
/// Every recognized field is enumerated here; empty collections and unset
/// options are omitted from the serialized payload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServiceRegistration {
    /// Unique service instance id
    #[serde(rename = "ID")]
    pub id: String,
    /// Logical service name
    #[serde(rename = "Service")]
    pub service: String,
    /// Service tags
    #[serde(rename = "Tags", skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    /// Static metadata
    #[serde(rename = "Meta", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub meta: BTreeMap<String, String>,
    /// Service port
    #[serde(rename = "Port", skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Per-tag network addresses
    #[serde(
        rename = "TaggedAddresses",
        skip_serializing_if = "BTreeMap::is_empty",
        default
    )]
    pub tagged_addresses: BTreeMap<String, ServiceAddress>,
    /// Registration kind, e.g. "connect-proxy"; plain services leave it unset
    #[serde(rename = "Kind", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Mesh connectivity marker
    #[serde(rename = "Connect", skip_serializing_if = "Option::is_none")]
    pub connect: Option<ConnectSettings>,
    /// Sidecar proxy configuration, only for kind "connect-proxy"
    #[serde(rename = "Proxy", skip_serializing_if = "Option::is_none")]
    pub proxy: Option<SidecarProxy>,
    /// Partition, empty when unsupported by the edition
    #[serde(rename = "Partition", skip_serializing_if = "String::is_empty", default)]
    pub partition: String,
    /// Namespace, empty when unsupported by the edition
    #[serde(rename = "Namespace", skip_serializing_if = "String::is_empty", default)]
    pub namespace: String,
}

/// Registration kind for sidecar proxies
pub const KIND_CONNECT_PROXY: &str = "connect-proxy";

/// A full catalog registration: node, address, and the service entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogRegistration {
    /// Node the service is registered against
    #[serde(rename = "Node")]
    pub node: String,
    /// Node address
    #[serde(rename = "Address")]
    pub address: String,
    /// Partition, empty when unsupported by the edition
    #[serde(rename = "Partition", skip_serializing_if = "String::is_empty", default)]
    pub partition: String,
    /// The service being registered
    #[serde(rename = "Service")]
    pub service: ServiceRegistration,
}

/// Request for a cross-cluster peering establishment token
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeeringTokenRequest {
    /// Name the remote peer will be known by
    #[serde(rename = "PeerName")]
    pub peer_name: String,
    /// Partition the peering is scoped to
    #[serde(rename = "Partition", skip_serializing_if = "String::is_empty", default)]
    pub partition: String,
}

/// Narrow interface to one catalog backend instance
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Smoke check: the instance answers and has elected a leader
    async fn ping(&self) -> Result<()>;

    /// Name of the node this client's agent runs as
    async fn node_name(&self) -> Result<String>;

    /// Which edition the backend reports
    async fn edition(&self) -> Result<CatalogEdition>;

    /// Names of all partitions that exist in this instance
    async fn list_partitions(&self) -> Result<Vec<String>>;

    /// Create a partition; only valid on multi-tenant editions
    async fn create_partition(&self, name: &str) -> Result<()>;

    /// Create a namespace inside a partition; the partition must exist
    async fn create_namespace(&self, name: &str, partition: &str) -> Result<()>;

    /// Register a service; the target namespace must already exist
    async fn register(&self, reg: &CatalogRegistration) -> Result<()>;

    /// Generate a peering establishment token scoped to a partition
    async fn generate_peering_token(&self, req: &PeeringTokenRequest) -> Result<String>;
}

/// HTTP implementation of [`CatalogApi`]
pub struct HttpCatalogClient {
    http: reqwest::Client,
    base: String,
}

impl HttpCatalogClient {
    /// Connect to the catalog HTTP API at the given base address
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base: addr.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn agent_self(&self) -> Result<serde_json::Value> {
        let resp = self
            .http
            .get(self.url("/v1/agent/self"))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl CatalogApi for HttpCatalogClient {
    async fn ping(&self) -> Result<()> {
        let resp = self
            .http
            .get(self.url("/v1/status/leader"))
            .send()
            .await?
            .error_for_status()?;
        let leader: String = resp.json().await?;
        if leader.is_empty() {
            return Err(Error::api("catalog", "no leader elected"));
        }
        Ok(())
    }

    async fn node_name(&self) -> Result<String> {
        let info = self.agent_self().await?;
        info["Config"]["NodeName"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::api("catalog", "agent self missing Config.NodeName"))
    }

    async fn edition(&self) -> Result<CatalogEdition> {
        let info = self.agent_self().await?;
        let version = info["Config"]["Version"].as_str().unwrap_or_default();
        if version.contains("+ent") {
            Ok(CatalogEdition::Enterprise)
        } else {
            Ok(CatalogEdition::Community)
        }
    }

    async fn list_partitions(&self) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Partition {
            #[serde(rename = "Name")]
            name: String,
        }
        let resp = self
            .http
            .get(self.url("/v1/partitions"))
            .send()
            .await?
            .error_for_status()?;
        let partitions: Vec<Partition> = resp.json().await?;
        Ok(partitions.into_iter().map(|p| p.name).collect())
    }

    async fn create_partition(&self, name: &str) -> Result<()> {
        self.http
            .put(self.url("/v1/partition"))
            .json(&serde_json::json!({ "Name": name }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn create_namespace(&self, name: &str, partition: &str) -> Result<()> {
        self.http
            .put(self.url("/v1/namespace"))
            .json(&serde_json::json!({ "Name": name, "Partition": partition }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn register(&self, reg: &CatalogRegistration) -> Result<()> {
        self.http
            .put(self.url("/v1/catalog/register"))
            .json(reg)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn generate_peering_token(&self, req: &PeeringTokenRequest) -> Result<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            #[serde(rename = "PeeringToken")]
            peering_token: String,
        }
        let resp = self
            .http
            .post(self.url("/v1/peering/token"))
            .json(req)
            .send()
            .await?
            .error_for_status()?;
        let token: TokenResponse = resp.json().await?;
        Ok(token.peering_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_service_payload_omits_unset_fields() {
        let reg = ServiceRegistration {
            id: "service-meta-default-default".into(),
            service: "service-meta-default-default".into(),
            tags: vec!["tag1".into()],
            meta: BTreeMap::from([("meta1".into(), "value1".into())]),
            ..Default::default()
        };
        let v = serde_json::to_value(&reg).unwrap();
        assert_eq!(v["Tags"][0], "tag1");
        assert_eq!(v["Meta"]["meta1"], "value1");
        assert!(v.get("Port").is_none());
        assert!(v.get("TaggedAddresses").is_none());
        assert!(v.get("Proxy").is_none());
        assert!(v.get("Partition").is_none());
        assert!(v.get("Namespace").is_none());
    }

    #[test]
    fn proxy_payload_references_upstream_by_name() {
        let reg = ServiceRegistration {
            id: "conn-enabled-service-proxy-default-default".into(),
            service: "conn-enabled-service-proxy-default-default".into(),
            port: Some(21999),
            kind: Some(KIND_CONNECT_PROXY.into()),
            proxy: Some(SidecarProxy {
                destination_service_name: "conn-enabled-service-default-default".into(),
            }),
            partition: "default".into(),
            namespace: "default".into(),
            ..Default::default()
        };
        let v = serde_json::to_value(&reg).unwrap();
        assert_eq!(v["Kind"], "connect-proxy");
        assert_eq!(
            v["Proxy"]["DestinationServiceName"],
            "conn-enabled-service-default-default"
        );
        assert_eq!(v["Partition"], "default");
    }

    #[test]
    fn tagged_addresses_serialize_per_tag() {
        let reg = ServiceRegistration {
            id: "svc".into(),
            service: "svc".into(),
            tagged_addresses: BTreeMap::from([
                (
                    "lan".into(),
                    ServiceAddress {
                        address: "192.0.2.1".into(),
                        port: 80,
                    },
                ),
                (
                    "wan".into(),
                    ServiceAddress {
                        address: "192.0.2.2".into(),
                        port: 443,
                    },
                ),
            ]),
            ..Default::default()
        };
        let v = serde_json::to_value(&reg).unwrap();
        assert_eq!(v["TaggedAddresses"]["lan"]["Port"], 80);
        assert_eq!(v["TaggedAddresses"]["wan"]["Address"], "192.0.2.2");
    }

    #[test]
    fn community_edition_has_no_tenancy() {
        assert!(!CatalogEdition::Community.is_multi_tenant());
        assert!(CatalogEdition::Enterprise.is_multi_tenant());
    }
}
