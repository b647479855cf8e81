//! HTTP probing of cluster nodes.
//!
//! `HttpProbe` wraps one shared [`reqwest::Client`] and exposes a single
//! generic `get` used by every endpoint this crate decodes. `NodeApiClient`
//! builds the per-node URLs and maps raw responses onto `chain-proto` types.
//! The `ClusterSource`/`OrdinalSource` traits exist purely so
//! `chain-health` can be tested against a fake without spinning up a network.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use chain_proto::{ClusterPeer, Layer, Node, NodeClusterView, NodeId, NodeInfo};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("node {node} unreachable: {source}")]
    Unreachable { node: NodeId, source: String },

    #[error("node {node} returned status {status}")]
    BadStatus { node: NodeId, status: u16 },

    #[error("could not decode response from {node}: {source}")]
    Decode { node: NodeId, source: String },

    #[error("node {node} has no port configured for layer {layer}")]
    MissingPort { node: NodeId, layer: Layer },
}

/// Thin wrapper around a shared `reqwest::Client`. The client itself carries
/// no default timeout — every call supplies its own, since cluster/ordinal
/// probes use a 5s budget and hypergraph probes use 8s.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .build()
                .expect("reqwest client builds with default TLS config"),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        node: &str,
        url: &str,
        timeout: Duration,
    ) -> Result<T, ProbeError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ProbeError::Unreachable {
                node: node.to_string(),
                source: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ProbeError::BadStatus {
                node: node.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| ProbeError::Decode {
            node: node.to_string(),
            source: e.to_string(),
        })
    }
}

const CLUSTER_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const ORDINAL_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const HYPERGRAPH_PROBE_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Deserialize)]
struct WirePeer {
    id: String,
    state: String,
    ip: Option<String>,
    #[serde(rename = "publicPort")]
    public_port: Option<u16>,
    #[serde(rename = "p2pPort")]
    p2p_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct WireNodeInfo {
    state: String,
    id: Option<String>,
    host: Option<String>,
    #[serde(rename = "publicPort")]
    public_port: Option<u16>,
    #[serde(rename = "p2pPort")]
    p2p_port: Option<u16>,
    #[serde(rename = "snapshotOrdinal")]
    snapshot_ordinal: Option<i64>,
    #[serde(rename = "lastSnapshotOrdinal")]
    last_snapshot_ordinal: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WireCheckpoint {
    ordinal: i64,
}

/// Source of `/cluster/info` views, abstracted for test substitution.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    async fn get_cluster(&self, node: &Node, layer: Layer) -> NodeClusterView;
}

/// Source of `/snapshot/latest/ordinal` readings, abstracted for test substitution.
#[async_trait]
pub trait OrdinalSource: Send + Sync {
    async fn get_ordinal(&self, node: &Node, layer: Layer) -> i64;
}

/// Source of raw `/node/info` results (error preserved, not collapsed to a
/// sentinel) for the unhealthy-node sweep, abstracted for test substitution.
#[async_trait]
pub trait NodeInfoSource: Send + Sync {
    async fn get_node_info_checked(&self, node: &Node, layer: Layer) -> Result<NodeInfo, ProbeError>;
}

/// Concrete HTTP-backed client for the three endpoints `chain-health` consumes.
#[derive(Debug, Clone)]
pub struct NodeApiClient {
    probe: HttpProbe,
}

impl Default for NodeApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeApiClient {
    pub fn new() -> Self {
        Self {
            probe: HttpProbe::new(),
        }
    }

    pub fn with_probe(probe: HttpProbe) -> Self {
        Self { probe }
    }

    fn base_url(node: &Node, layer: Layer, port: impl Fn(&chain_proto::PortSet) -> u16) -> Result<String, ProbeError> {
        let ports = node.port_set(layer).ok_or_else(|| ProbeError::MissingPort {
            node: node.id.clone(),
            layer,
        })?;
        Ok(format!("http://{}:{}", node.host, port(&ports)))
    }

    /// `GET /cluster/info` on the node's public port for `layer`.
    pub async fn get_cluster(&self, node: &Node, layer: Layer) -> NodeClusterView {
        let now = Utc::now();
        let base = match Self::base_url(node, layer, |p| p.public) {
            Ok(b) => b,
            Err(e) => return NodeClusterView::unreachable(node.id.clone(), layer, e.to_string(), now),
        };
        let url = format!("{base}/cluster/info");

        match self.probe.get::<Vec<WirePeer>>(&node.id, &url, CLUSTER_PROBE_TIMEOUT).await {
            Ok(peers) => {
                let peers = peers
                    .into_iter()
                    .map(|p| ClusterPeer {
                        id: p.id,
                        state: p.state,
                        host: p.ip,
                        public_port: p.public_port,
                        p2p_port: p.p2p_port,
                    })
                    .collect();
                NodeClusterView::healthy(node.id.clone(), layer, peers, now)
            }
            Err(e) => {
                debug!(node = %node.id, %layer, error = %e, "cluster probe failed");
                NodeClusterView::unreachable(node.id.clone(), layer, e.to_string(), now)
            }
        }
    }

    /// Ordinal reading for `layer`. `L0g` is read off `/node/info`
    /// (`snapshotOrdinal ?? lastSnapshotOrdinal ?? 0`); every other layer is
    /// read off `/data-application/v1/checkpoint`. Returns `-1` on any
    /// failure — the stall tracker treats absence as evidence, not an error.
    pub async fn get_ordinal(&self, node: &Node, layer: Layer) -> i64 {
        if layer == Layer::L0g {
            return self.get_ordinal_from_node_info(node, layer).await;
        }

        let base = match Self::base_url(node, layer, |p| p.cli) {
            Ok(b) => b,
            Err(e) => {
                warn!(node = %node.id, %layer, error = %e, "ordinal probe has no port configured");
                return -1;
            }
        };
        let url = format!("{base}/data-application/v1/checkpoint");

        match self.probe.get::<WireCheckpoint>(&node.id, &url, ORDINAL_PROBE_TIMEOUT).await {
            Ok(cp) if cp.ordinal >= 0 => cp.ordinal,
            Ok(_) => -1,
            Err(e) => {
                debug!(node = %node.id, %layer, error = %e, "ordinal probe failed");
                -1
            }
        }
    }

    async fn get_ordinal_from_node_info(&self, node: &Node, layer: Layer) -> i64 {
        match self.get_node_info(node, layer).await {
            Ok(info) => info
                .snapshot_ordinal
                .or(info.last_snapshot_ordinal)
                .unwrap_or(0),
            Err(e) => {
                debug!(node = %node.id, %layer, error = %e, "ordinal probe failed");
                -1
            }
        }
    }

    /// `GET /node/info` on the node's public port for `layer`.
    pub async fn get_node_info(&self, node: &Node, layer: Layer) -> Result<NodeInfo, ProbeError> {
        let base = Self::base_url(node, layer, |p| p.public)?;
        let url = format!("{base}/node/info");

        let wire = self.probe.get::<WireNodeInfo>(&node.id, &url, CLUSTER_PROBE_TIMEOUT).await?;
        Ok(NodeInfo {
            state: wire.state,
            id: wire.id,
            host: wire.host,
            public_port: wire.public_port,
            p2p_port: wire.p2p_port,
            snapshot_ordinal: wire.snapshot_ordinal,
            last_snapshot_ordinal: wire.last_snapshot_ordinal,
        })
    }

    /// Plain HTTP GET against an arbitrary hypergraph health URL, decoded as
    /// a single `WireNodeInfo`-shaped state string. Used only by the
    /// best-effort hypergraph detector, never for restart decisions.
    pub async fn get_hypergraph_health(&self, url: &str) -> Result<String, ProbeError> {
        #[derive(Deserialize)]
        struct Wire {
            state: String,
        }
        let wire: Wire = self.probe.get(url, url, HYPERGRAPH_PROBE_TIMEOUT).await?;
        Ok(wire.state)
    }
}

#[async_trait]
impl ClusterSource for NodeApiClient {
    async fn get_cluster(&self, node: &Node, layer: Layer) -> NodeClusterView {
        NodeApiClient::get_cluster(self, node, layer).await
    }
}

#[async_trait]
impl OrdinalSource for NodeApiClient {
    async fn get_ordinal(&self, node: &Node, layer: Layer) -> i64 {
        NodeApiClient::get_ordinal(self, node, layer).await
    }
}

#[async_trait]
impl NodeInfoSource for NodeApiClient {
    async fn get_node_info_checked(&self, node: &Node, layer: Layer) -> Result<NodeInfo, ProbeError> {
        NodeApiClient::get_node_info(self, node, layer).await
    }
}
