//! Validated, immutable cluster membership.
//!
//! Built once at startup from configuration and shared (via `Arc`) across
//! every tick for the life of the process.

use chain_proto::{validate_node_id, Node};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("node list is empty")]
    Empty,
    #[error("invalid node id: {0}")]
    InvalidId(String),
    #[error("duplicate node id: {0}")]
    DuplicateId(String),
}

/// The cluster's member nodes, in configured order. Order matters: it is
/// the iteration order used for genesis election during a full-layer or
/// full-metagraph restart (spec §4.7, lowest index wins — spec.md §9 open
/// question, resolved in DESIGN.md).
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    nodes: Vec<Node>,
}

impl ClusterTopology {
    pub fn new(nodes: Vec<Node>) -> Result<Self, TopologyError> {
        if nodes.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut seen = HashSet::with_capacity(nodes.len());
        for node in &nodes {
            if !validate_node_id(&node.id) {
                return Err(TopologyError::InvalidId(node.id.clone()));
            }
            if !seen.insert(node.id.clone()) {
                return Err(TopologyError::DuplicateId(node.id.clone()));
            }
        }

        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The genesis node for a restart: the first node in configured order.
    /// Stable across ticks because the list is immutable for the process
    /// lifetime.
    pub fn genesis(&self) -> &Node {
        &self.nodes[0]
    }

    pub fn find(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
