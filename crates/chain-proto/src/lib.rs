//! Domain types for the chain fleet monitor.
//!
//! Defines the node/layer topology, the per-tick observation shapes
//! (`ClusterSnapshot`, `OrdinalSnapshot`), and the event/restart vocabulary
//! the detection and orchestration crates exchange.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─── Layer ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Global consensus.
    L0g,
    /// Metagraph consensus.
    L0m,
    /// Currency / consensus layer.
    L1c,
    /// Data layer.
    L1d,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::L0g => write!(f, "L0g"),
            Self::L0m => write!(f, "L0m"),
            Self::L1c => write!(f, "L1c"),
            Self::L1d => write!(f, "L1d"),
        }
    }
}

/// Order layers start in during a full-metagraph restart.
pub const STARTUP_ORDER: [Layer; 4] = [Layer::L0m, Layer::L0g, Layer::L1c, Layer::L1d];

/// Order layers stop in during a full-metagraph restart (reverse of startup).
pub const STOP_ORDER: [Layer; 4] = [Layer::L1d, Layer::L1c, Layer::L0g, Layer::L0m];

/// Layers checked for forks, in priority order. The first forked layer wins
/// and no further layers are probed that tick.
pub const FORK_CHECK_ORDER: [Layer; 3] = [Layer::L0m, Layer::L1c, Layer::L1d];

/// Layers reported as affected by a cluster-wide snapshot stall.
pub const STALL_AFFECTED_LAYERS: [Layer; 3] = [Layer::L0m, Layer::L1c, Layer::L1d];

/// All four layers — used by the unhealthy-node sweep.
pub const ALL_LAYERS: [Layer; 4] = [Layer::L0g, Layer::L0m, Layer::L1c, Layer::L1d];

// ─── Node & Topology ──────────────────────────────────────────────────────────

pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSet {
    pub public: u16,
    pub p2p: u16,
    pub cli: u16,
}

/// A cluster member. Identity is `id`; `host` is the network address.
/// Immutable for the process lifetime once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub host: String,
    pub layers: HashMap<Layer, PortSet>,
}

impl Node {
    pub fn port_set(&self, layer: Layer) -> Option<PortSet> {
        self.layers.get(&layer).copied()
    }
}

/// Validate a node id: non-empty, bounded length, unambiguous charset.
pub fn validate_node_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

// ─── Cluster view ─────────────────────────────────────────────────────────────

/// One node's report of its cluster peers.
///
/// Only `id` and `state` participate in equality — transient fields like
/// `host`/ports do not affect whether two peers are considered "the same".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterPeer {
    pub id: String,
    pub state: String,
    pub host: Option<String>,
    pub public_port: Option<u16>,
    pub p2p_port: Option<u16>,
}

impl PartialEq for ClusterPeer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.state == other.state
    }
}
impl Eq for ClusterPeer {}

/// One node's cluster view for one layer at one tick.
///
/// `error.is_some()` iff `peers` is empty (data model invariant 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeClusterView {
    pub node: NodeId,
    pub layer: Layer,
    pub peers: Vec<ClusterPeer>,
    pub polled_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl NodeClusterView {
    pub fn healthy(node: NodeId, layer: Layer, peers: Vec<ClusterPeer>, polled_at: DateTime<Utc>) -> Self {
        Self { node, layer, peers, polled_at, error: None }
    }

    pub fn unreachable(node: NodeId, layer: Layer, reason: String, polled_at: DateTime<Utc>) -> Self {
        Self { node, layer, peers: Vec::new(), polled_at, error: Some(reason) }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn invariant_holds(&self) -> bool {
        self.error.is_some() == self.peers.is_empty()
    }
}

/// One layer's snapshot of every node's cluster view, for one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub layer: Layer,
    pub timestamp: DateTime<Utc>,
    pub views: Vec<NodeClusterView>,
}

// ─── Ordinal observation ──────────────────────────────────────────────────────

/// A single (node, layer) ordinal reading. `ordinal < 0` is the sentinel for
/// "could not be obtained" — see `getOrdinal` in `chain-probe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdinalSnapshot {
    pub node: NodeId,
    pub layer: Layer,
    pub ordinal: i64,
    pub timestamp: DateTime<Utc>,
}

/// Decoded shape of `GET /node/info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub state: String,
    pub id: Option<String>,
    pub host: Option<String>,
    pub public_port: Option<u16>,
    pub p2p_port: Option<u16>,
    pub snapshot_ordinal: Option<i64>,
    pub last_snapshot_ordinal: Option<i64>,
}

/// States a `/node/info` response may report that count as healthy.
/// Anything outside this set is unhealthy (spec §4.5).
pub const HEALTHY_NODE_STATES: [&str; 2] = ["Ready", "Observing"];

// ─── Health events ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Healthy,
    ForkDetected,
    SnapshotStall,
    NodeUnreachable,
    HypergraphHealth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartScope {
    None,
    IndividualNode,
    FullLayer,
    FullMetagraph,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEvent {
    pub condition: Condition,
    pub layer: Option<Layer>,
    pub node_ids: Vec<NodeId>,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub suggested_action: RestartScope,
}

impl HealthEvent {
    /// Data model invariant 4: `suggested_action == None` iff not actionable.
    pub fn is_actionable(&self) -> bool {
        self.suggested_action != RestartScope::None
    }
}

// ─── Restart history ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartOutcome {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartRecord {
    pub scope: RestartScope,
    pub layer: Option<Layer>,
    pub node_ids: Vec<NodeId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: RestartOutcome,
}
