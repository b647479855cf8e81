//! Fork detection, stall tracking, and the per-tick condition engine.
//!
//! Detectors never raise — each returns a structured outcome and the
//! Condition Engine sequences them in the fixed priority order the
//! orchestrator depends on: a fork can masquerade as a stall, and a stall
//! can masquerade as a set of unreachable nodes, so later detectors only
//! run once earlier ones have ruled themselves out for the tick.

#![forbid(unsafe_code)]

use chain_probe::{ClusterSource, NodeInfoSource, OrdinalSource, ProbeError};
use chain_proto::{
    ClusterSnapshot, Condition, HealthEvent, Layer, Node, NodeClusterView, NodeId, NodeInfo,
    RestartScope, ALL_LAYERS, FORK_CHECK_ORDER, HEALTHY_NODE_STATES, STALL_AFFECTED_LAYERS,
};
use chrono::{DateTime, Utc};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod topology;
pub use topology::{ClusterTopology, TopologyError};

// ─── Fork Detector ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForkOutcome {
    NoFork,
    Fork {
        majority: Vec<NodeId>,
        minority: Vec<NodeId>,
        suggested_action: RestartScope,
    },
    AllUnreachable {
        nodes: Vec<NodeId>,
    },
}

/// Canonical grouping key for one node's cluster view: the sorted set of
/// peer ids for a healthy view, or a singleton marker for errors/empties.
fn view_key(view: &NodeClusterView) -> String {
    if view.is_error() {
        return format!("\u{27c2}ERROR:{}", view.node);
    }
    if view.peers.is_empty() {
        return "\u{27c2}EMPTY".to_string();
    }
    let mut ids: Vec<&str> = view.peers.iter().map(|p| p.id.as_str()).collect();
    ids.sort_unstable();
    ids.join(",")
}

/// Reduce a layer's cluster snapshot to a majority/minority partition.
///
/// Empty healthy views form their own `⟂EMPTY` group rather than being
/// treated as errors — a node that is up but reports zero peers is a
/// distinct symptom from one that couldn't be reached at all.
pub fn detect_fork(snapshot: &ClusterSnapshot) -> ForkOutcome {
    let mut groups: HashMap<String, Vec<&NodeClusterView>> = HashMap::new();
    let mut unreachable: Vec<NodeId> = Vec::new();

    for view in &snapshot.views {
        if view.is_error() {
            unreachable.push(view.node.clone());
            continue;
        }
        groups.entry(view_key(view)).or_default().push(view);
    }

    if groups.is_empty() {
        unreachable.sort();
        return ForkOutcome::AllUnreachable { nodes: unreachable };
    }

    // argmax by group size; ties broken by lexicographically smaller key.
    let majority_key = groups
        .keys()
        .cloned()
        .max_by(|a, b| groups[a].len().cmp(&groups[b].len()).then_with(|| b.cmp(a)))
        .expect("groups is non-empty");

    let mut majority: Vec<NodeId> = groups[&majority_key].iter().map(|v| v.node.clone()).collect();
    majority.sort();

    let mut minority: Vec<NodeId> = groups
        .iter()
        .filter(|(k, _)| **k != majority_key)
        .flat_map(|(_, views)| views.iter().map(|v| v.node.clone()))
        .collect();
    minority.sort();

    if minority.is_empty() {
        return ForkOutcome::NoFork;
    }

    let suggested_action = if minority.len() < majority.len() {
        RestartScope::IndividualNode
    } else {
        RestartScope::FullLayer
    };

    ForkOutcome::Fork { majority, minority, suggested_action }
}

// ─── Stall Tracker ────────────────────────────────────────────────────────────

/// A synthetic key tracks cluster-wide liveness for a layer (spec §4.4);
/// `Node` keys are available for callers that want per-node staleness.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StallKey {
    Node(NodeId, Layer),
    Cluster(Layer),
}

#[derive(Debug, Clone, Copy)]
struct StallEntry {
    last_ordinal: i64,
    last_changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Advanced,
    Stalled { since: DateTime<Utc> },
}

/// Mutable state machine tracking last-seen ordinal and time-of-change per
/// key. Owned exclusively by the Monitor Loop — never shared across ticks.
pub struct StallTracker {
    entries: HashMap<StallKey, StallEntry>,
    now: fn() -> DateTime<Utc>,
}

impl Default for StallTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StallTracker {
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    /// Construct with an injected clock, for deterministic stall-threshold tests.
    pub fn with_clock(now: fn() -> DateTime<Utc>) -> Self {
        Self { entries: HashMap::new(), now }
    }

    /// First observation of a key is `Advanced` — the tracker has no
    /// evidence of a stall until it has seen the *same* key twice.
    pub fn update(&mut self, key: StallKey, ordinal: i64) -> UpdateOutcome {
        let now = (self.now)();
        match self.entries.get_mut(&key) {
            None => {
                self.entries.insert(
                    key,
                    StallEntry { last_ordinal: ordinal, last_changed_at: now },
                );
                UpdateOutcome::Advanced
            }
            Some(entry) => {
                if ordinal > entry.last_ordinal {
                    entry.last_ordinal = ordinal;
                    entry.last_changed_at = now;
                    UpdateOutcome::Advanced
                } else {
                    UpdateOutcome::Stalled { since: entry.last_changed_at }
                }
            }
        }
    }

    /// Seconds since the key last advanced; `None` if never observed.
    pub fn stale_secs(&self, key: &StallKey) -> Option<i64> {
        self.entries
            .get(key)
            .map(|e| ((self.now)() - e.last_changed_at).num_seconds())
    }
}

/// Given the first non-negative ordinal seen this tick across all nodes for
/// `L0m`, update the synthetic cluster key and decide whether the cluster
/// has been stalled for at least `threshold_secs`. Returns `None` when no
/// node produced an ordinal — that's an unreachable-nodes problem, not a
/// stall (spec §4.4 step 1). `all_node_ids` populates the event's
/// `affectedNodes = all` per spec §4.4 step 3 — the orchestrator ignores it
/// for a `FullMetagraph` restart, but the notifier message still needs it.
pub fn check_cluster_stall(
    tracker: &mut StallTracker,
    canonical_ordinal: Option<i64>,
    threshold_secs: i64,
    all_node_ids: &[NodeId],
) -> Option<HealthEvent> {
    let ordinal = canonical_ordinal?;
    let key = StallKey::Cluster(Layer::L0m);
    tracker.update(key.clone(), ordinal);

    let stale = tracker.stale_secs(&key)?;
    if stale < threshold_secs {
        return None;
    }

    Some(HealthEvent {
        condition: Condition::SnapshotStall,
        layer: Some(Layer::L0m),
        node_ids: all_node_ids.to_vec(),
        description: format!(
            "L0m snapshot ordinal has not advanced in {stale}s (threshold {threshold_secs}s)"
        ),
        timestamp: Utc::now(),
        suggested_action: RestartScope::FullMetagraph,
    })
}

/// The layers reported as affected by a cluster-wide stall.
pub fn stall_affected_layers() -> &'static [Layer] {
    &STALL_AFFECTED_LAYERS
}

// ─── Unhealthy Node Detector ──────────────────────────────────────────────────

/// The outcome of one `getNodeInfo` call, kept alongside its (node, layer) key.
pub struct NodeHealthCheck {
    pub node: NodeId,
    pub layer: Layer,
    pub result: Result<NodeInfo, ProbeError>,
}

/// Sweep every (node, layer) `/node/info` result and report the failing set.
pub fn detect_unhealthy(checks: &[NodeHealthCheck]) -> Option<HealthEvent> {
    let total = checks.len();
    if total == 0 {
        return None;
    }

    let mut failing: Vec<(NodeId, Layer)> = Vec::new();
    for check in checks {
        let is_bad = match &check.result {
            Err(ProbeError::Unreachable { .. }) => {
                debug!(node = %check.node, layer = %check.layer, "node unreachable");
                true
            }
            Err(other) => {
                warn!(node = %check.node, layer = %check.layer, error = %other, "node/info probe error");
                true
            }
            Ok(info) => !HEALTHY_NODE_STATES.contains(&info.state.as_str()),
        };
        if is_bad {
            failing.push((check.node.clone(), check.layer));
        }
    }

    if failing.is_empty() {
        return None;
    }

    let mut per_layer_total: HashMap<Layer, usize> = HashMap::new();
    for check in checks {
        *per_layer_total.entry(check.layer).or_insert(0) += 1;
    }
    let mut per_layer_down: HashMap<Layer, usize> = HashMap::new();
    for (_, layer) in &failing {
        *per_layer_down.entry(*layer).or_insert(0) += 1;
    }

    let majority_down_layers: Vec<Layer> = per_layer_total
        .iter()
        .filter(|(layer, total)| {
            let down = per_layer_down.get(*layer).copied().unwrap_or(0);
            down * 2 >= **total
        })
        .map(|(layer, _)| *layer)
        .collect();

    let suggested_action = if failing.len() * 2 < total {
        RestartScope::IndividualNode
    } else if majority_down_layers.len() >= 2 {
        RestartScope::FullMetagraph
    } else {
        RestartScope::FullLayer
    };

    let worst_layer = per_layer_down
        .iter()
        .max_by_key(|(_, down)| **down)
        .map(|(layer, _)| *layer);

    let mut node_ids: Vec<NodeId> = failing.iter().map(|(node, _)| node.clone()).collect();
    node_ids.sort();
    node_ids.dedup();

    // FullMetagraph restarts every layer so the event carries no single
    // layer; IndividualNode and FullLayer both need one to act on.
    let layer = match suggested_action {
        RestartScope::FullMetagraph => None,
        _ => worst_layer,
    };

    Some(HealthEvent {
        condition: Condition::NodeUnreachable,
        layer,
        node_ids,
        description: format!("{} of {total} node/layer checks unhealthy", failing.len()),
        timestamp: Utc::now(),
        suggested_action,
    })
}

// ─── Hypergraph condition (never actuates) ───────────────────────────────────

/// Best-effort external-hypergraph connectivity check. Per the Open Question
/// in spec.md §9 this heuristic is weak for clusters with more than a
/// handful of local nodes; it is left as-is and never produces an
/// actionable event — `suggested_action` is always `RestartScope::None`.
/// Runs on its own interval, independent of the fork/stall/unhealthy chain.
/// The local view of `L0g` peer-set size used by the hypergraph heuristic:
/// the largest peer count reported by any reachable local node. A node with
/// no reachable view at all contributes zero, which reads as "disconnected".
pub fn local_l0g_peer_count(snapshot: &ClusterSnapshot) -> usize {
    snapshot
        .views
        .iter()
        .filter(|v| !v.is_error())
        .map(|v| v.peers.len())
        .max()
        .unwrap_or(0)
}

pub fn check_hypergraph_health(local_l0g_peer_count: usize, local_node_count: usize) -> Option<HealthEvent> {
    if local_l0g_peer_count > local_node_count {
        return None;
    }

    Some(HealthEvent {
        condition: Condition::HypergraphHealth,
        layer: Some(Layer::L0g),
        node_ids: Vec::new(),
        description: format!(
            "local L0g view has {local_l0g_peer_count} peers, no larger than the {local_node_count} local nodes — possibly disconnected from the global hypergraph"
        ),
        timestamp: Utc::now(),
        suggested_action: RestartScope::None,
    })
}

// ─── Condition Engine ─────────────────────────────────────────────────────────

/// Runs the fixed priority sequence — fork, then stall, then unhealthy —
/// stopping at the first condition detected. Internal fan-out uses a
/// bounded worker pool so an unresponsive node can't stall the whole tick.
pub struct ConditionEngine<S> {
    topology: Arc<ClusterTopology>,
    source: Arc<S>,
    stall_tracker: StallTracker,
    snapshot_stall_secs: i64,
}

impl<S> ConditionEngine<S>
where
    S: ClusterSource + OrdinalSource + NodeInfoSource + 'static,
{
    pub fn new(topology: Arc<ClusterTopology>, source: Arc<S>, snapshot_stall_secs: i64) -> Self {
        Self {
            topology,
            source,
            stall_tracker: StallTracker::new(),
            snapshot_stall_secs,
        }
    }

    fn worker_cap(&self) -> usize {
        let pairs = self.topology.nodes().len() * ALL_LAYERS.len();
        pairs.min(16).max(1)
    }

    /// Nodes under management, for callers (e.g. the hypergraph checker)
    /// that need the local node count but not the full tick.
    pub fn local_node_count(&self) -> usize {
        self.topology.nodes().len()
    }

    /// Fetch one layer's cluster snapshot outside the fork-check sequence.
    /// Used by the hypergraph checker, which samples `L0g` on its own
    /// interval rather than every tick.
    pub async fn fetch_layer_snapshot(&self, layer: Layer) -> ClusterSnapshot {
        self.fetch_cluster_snapshot(layer).await
    }

    async fn fetch_cluster_snapshot(&self, layer: Layer) -> ClusterSnapshot {
        let cap = self.worker_cap();
        let mut futures = FuturesUnordered::new();
        let mut views = Vec::with_capacity(self.topology.nodes().len());
        let mut nodes = self.topology.nodes().iter();

        for node in nodes.by_ref().take(cap) {
            let source = Arc::clone(&self.source);
            let node = node.clone();
            futures.push(async move { source.get_cluster(&node, layer).await });
        }
        while let Some(view) = futures.next().await {
            views.push(view);
            if let Some(node) = nodes.next() {
                let source = Arc::clone(&self.source);
                let node = node.clone();
                futures.push(async move { source.get_cluster(&node, layer).await });
            }
        }

        ClusterSnapshot { layer, timestamp: Utc::now(), views }
    }

    async fn fetch_canonical_ordinal(&self) -> Option<i64> {
        for node in self.topology.nodes() {
            let ordinal = self.source.get_ordinal(node, Layer::L0m).await;
            if ordinal >= 0 {
                return Some(ordinal);
            }
        }
        None
    }

    /// Runs one full tick: fork detection per layer in priority order, then
    /// the cluster stall check, then the unhealthy-node sweep. Returns the
    /// first actionable (or informational) event, if any.
    pub async fn run_tick(&mut self) -> Option<HealthEvent> {
        for layer in FORK_CHECK_ORDER {
            let snapshot = self.fetch_cluster_snapshot(layer).await;
            match detect_fork(&snapshot) {
                ForkOutcome::NoFork => continue,
                ForkOutcome::Fork { majority, minority, suggested_action } => {
                    return Some(HealthEvent {
                        condition: Condition::ForkDetected,
                        layer: Some(layer),
                        node_ids: minority,
                        description: format!(
                            "fork on {layer}: majority {majority:?} vs minority"
                        ),
                        timestamp: Utc::now(),
                        suggested_action,
                    });
                }
                ForkOutcome::AllUnreachable { nodes } => {
                    return Some(HealthEvent {
                        condition: Condition::NodeUnreachable,
                        layer: Some(layer),
                        node_ids: nodes,
                        description: format!("all nodes unreachable on {layer}"),
                        timestamp: Utc::now(),
                        suggested_action: RestartScope::FullLayer,
                    });
                }
            }
        }

        let canonical_ordinal = self.fetch_canonical_ordinal().await;
        let all_node_ids: Vec<NodeId> = self.topology.nodes().iter().map(|n| n.id.clone()).collect();
        if let Some(event) = check_cluster_stall(
            &mut self.stall_tracker,
            canonical_ordinal,
            self.snapshot_stall_secs,
            &all_node_ids,
        ) {
            return Some(event);
        }

        let checks = self.fetch_node_health_checks().await;
        detect_unhealthy(&checks)
    }

    async fn fetch_node_health_checks(&self) -> Vec<NodeHealthCheck> {
        let cap = self.worker_cap();
        let pairs: Vec<(Node, Layer)> = self
            .topology
            .nodes()
            .iter()
            .flat_map(|n| ALL_LAYERS.iter().map(move |l| (n.clone(), *l)))
            .collect();

        let mut futures = FuturesUnordered::new();
        let mut results = Vec::with_capacity(pairs.len());
        let mut iter = pairs.into_iter();

        for (node, layer) in iter.by_ref().take(cap) {
            let source = Arc::clone(&self.source);
            futures.push(async move {
                let result = source.get_node_info_checked(&node, layer).await;
                NodeHealthCheck { node: node.id, layer, result }
            });
        }
        while let Some(check) = futures.next().await {
            results.push(check);
            if let Some((node, layer)) = iter.next() {
                let source = Arc::clone(&self.source);
                futures.push(async move {
                    let result = source.get_node_info_checked(&node, layer).await;
                    NodeHealthCheck { node: node.id, layer, result }
                });
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_proto::ClusterPeer;
    use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

    fn peer(id: &str) -> ClusterPeer {
        ClusterPeer { id: id.to_string(), state: "Ready".to_string(), host: None, public_port: None, p2p_port: None }
    }

    fn healthy_view(node: &str, peers: &[&str]) -> NodeClusterView {
        NodeClusterView::healthy(
            node.to_string(),
            Layer::L0m,
            peers.iter().map(|p| peer(p)).collect(),
            Utc::now(),
        )
    }

    fn error_view(node: &str) -> NodeClusterView {
        NodeClusterView::unreachable(node.to_string(), Layer::L0m, "timeout".to_string(), Utc::now())
    }

    #[test]
    fn test_no_fork_when_all_views_agree() {
        let snapshot = ClusterSnapshot {
            layer: Layer::L0m,
            timestamp: Utc::now(),
            views: vec![
                healthy_view("n1", &["p1", "p2", "p3"]),
                healthy_view("n2", &["p3", "p1", "p2"]),
                healthy_view("n3", &["p2", "p3", "p1"]),
            ],
        };
        assert_eq!(detect_fork(&snapshot), ForkOutcome::NoFork);
    }

    #[test]
    fn test_single_node_fork_is_individual_node() {
        let snapshot = ClusterSnapshot {
            layer: Layer::L0m,
            timestamp: Utc::now(),
            views: vec![
                healthy_view("n1", &["p1", "p2"]),
                healthy_view("n2", &["p1", "p2"]),
                healthy_view("n3", &["p3"]),
            ],
        };
        match detect_fork(&snapshot) {
            ForkOutcome::Fork { majority, minority, suggested_action } => {
                assert_eq!(majority, vec!["n1".to_string(), "n2".to_string()]);
                assert_eq!(minority, vec!["n3".to_string()]);
                assert_eq!(suggested_action, RestartScope::IndividualNode);
            }
            other => panic!("expected Fork, got {other:?}"),
        }
    }

    #[test]
    fn test_three_way_fork_is_full_layer() {
        let snapshot = ClusterSnapshot {
            layer: Layer::L1c,
            timestamp: Utc::now(),
            views: vec![
                healthy_view("n1", &["n1"]),
                healthy_view("n2", &["n2"]),
                healthy_view("n3", &["n3"]),
            ],
        };
        match detect_fork(&snapshot) {
            ForkOutcome::Fork { suggested_action, .. } => {
                assert_eq!(suggested_action, RestartScope::FullLayer);
            }
            other => panic!("expected Fork, got {other:?}"),
        }
    }

    #[test]
    fn test_all_unreachable_is_not_a_fork() {
        let snapshot = ClusterSnapshot {
            layer: Layer::L0m,
            timestamp: Utc::now(),
            views: vec![error_view("n1"), error_view("n2")],
        };
        match detect_fork(&snapshot) {
            ForkOutcome::AllUnreachable { nodes } => {
                assert_eq!(nodes, vec!["n1".to_string(), "n2".to_string()]);
            }
            other => panic!("expected AllUnreachable, got {other:?}"),
        }
    }

    #[test]
    fn test_mixed_healthy_and_error_views_reports_unreachable_not_fork() {
        let snapshot = ClusterSnapshot {
            layer: Layer::L0m,
            timestamp: Utc::now(),
            views: vec![
                healthy_view("n1", &["p1", "p2"]),
                healthy_view("n2", &["p1", "p2"]),
                error_view("n3"),
            ],
        };
        assert_eq!(detect_fork(&snapshot), ForkOutcome::NoFork);
    }

    fn fixed_clock() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_stall_tracker_first_observation_is_advanced() {
        let mut tracker = StallTracker::with_clock(fixed_clock);
        let key = StallKey::Node("n1".to_string(), Layer::L0m);
        assert_eq!(tracker.update(key, 100), UpdateOutcome::Advanced);
    }

    #[test]
    fn test_stall_tracker_plateau_reports_stalled_since() {
        let mut tracker = StallTracker::with_clock(fixed_clock);
        let key = StallKey::Node("n1".to_string(), Layer::L0m);
        tracker.update(key.clone(), 100);
        let outcome = tracker.update(key, 100);
        assert_eq!(outcome, UpdateOutcome::Stalled { since: fixed_clock() });
    }

    #[test]
    fn test_stall_tracker_advance_resets() {
        let mut tracker = StallTracker::with_clock(fixed_clock);
        let key = StallKey::Node("n1".to_string(), Layer::L0m);
        tracker.update(key.clone(), 100);
        assert_eq!(tracker.update(key, 101), UpdateOutcome::Advanced);
    }

    #[test]
    fn test_cluster_stall_no_event_below_threshold() {
        let mut tracker = StallTracker::with_clock(fixed_clock);
        let nodes = ["n1".to_string(), "n2".to_string()];
        assert!(check_cluster_stall(&mut tracker, Some(500), 240, &nodes).is_none());
    }

    #[test]
    fn test_cluster_stall_no_ordinal_is_no_event() {
        let mut tracker = StallTracker::with_clock(fixed_clock);
        let nodes = ["n1".to_string(), "n2".to_string()];
        assert!(check_cluster_stall(&mut tracker, None, 240, &nodes).is_none());
    }

    static STALL_CLOCK_OFFSET_SECS: AtomicI64 = AtomicI64::new(0);

    fn advancing_clock() -> DateTime<Utc> {
        fixed_clock() + chrono::Duration::seconds(STALL_CLOCK_OFFSET_SECS.load(AtomicOrdering::SeqCst))
    }

    #[test]
    fn test_cluster_stall_event_reports_all_nodes() {
        STALL_CLOCK_OFFSET_SECS.store(0, AtomicOrdering::SeqCst);
        let mut tracker = StallTracker::with_clock(advancing_clock);
        let nodes = ["n1".to_string(), "n2".to_string(), "n3".to_string()];

        assert!(check_cluster_stall(&mut tracker, Some(500), 100, &nodes).is_none());

        STALL_CLOCK_OFFSET_SECS.store(150, AtomicOrdering::SeqCst);
        let event = check_cluster_stall(&mut tracker, Some(500), 100, &nodes).expect("expected stall event");
        assert_eq!(event.node_ids, nodes);
    }

    fn ok_check(node: &str, layer: Layer, state: &str) -> NodeHealthCheck {
        NodeHealthCheck {
            node: node.to_string(),
            layer,
            result: Ok(NodeInfo {
                state: state.to_string(),
                id: None,
                host: None,
                public_port: None,
                p2p_port: None,
                snapshot_ordinal: None,
                last_snapshot_ordinal: None,
            }),
        }
    }

    fn unreachable_check(node: &str, layer: Layer) -> NodeHealthCheck {
        NodeHealthCheck {
            node: node.to_string(),
            layer,
            result: Err(ProbeError::Unreachable { node: node.to_string(), source: "timeout".to_string() }),
        }
    }

    #[test]
    fn test_detect_unhealthy_all_healthy_is_none() {
        let checks = vec![ok_check("n1", Layer::L0m, "Ready"), ok_check("n2", Layer::L0m, "Observing")];
        assert!(detect_unhealthy(&checks).is_none());
    }

    #[test]
    fn test_detect_unhealthy_minority_down_is_individual_node() {
        let checks = vec![
            ok_check("n1", Layer::L0m, "Ready"),
            ok_check("n2", Layer::L0m, "Ready"),
            ok_check("n3", Layer::L0m, "Ready"),
            unreachable_check("n4", Layer::L0m),
        ];
        let event = detect_unhealthy(&checks).expect("expected event");
        assert_eq!(event.suggested_action, RestartScope::IndividualNode);
        assert_eq!(event.node_ids, vec!["n4".to_string()]);
        assert_eq!(
            event.layer,
            Some(Layer::L0m),
            "an individual-node restart needs a layer to act on"
        );
    }

    #[test]
    fn test_detect_unhealthy_majority_down_is_full_layer() {
        let checks = vec![
            ok_check("n1", Layer::L0m, "Ready"),
            unreachable_check("n2", Layer::L0m),
            unreachable_check("n3", Layer::L0m),
        ];
        let event = detect_unhealthy(&checks).expect("expected event");
        assert_eq!(event.suggested_action, RestartScope::FullLayer);
    }

    #[test]
    fn test_hypergraph_never_actionable() {
        let event = check_hypergraph_health(1, 3).expect("expected event");
        assert_eq!(event.suggested_action, RestartScope::None);
        assert!(!event.is_actionable());
    }

    #[test]
    fn test_hypergraph_silent_when_peer_count_exceeds_local() {
        assert!(check_hypergraph_health(5, 3).is_none());
    }

    #[test]
    fn test_local_l0g_peer_count_ignores_error_views() {
        let snapshot = ClusterSnapshot {
            layer: Layer::L0g,
            timestamp: Utc::now(),
            views: vec![error_view("n1"), healthy_view("n2", &["p1", "p2", "p3", "p4"])],
        };
        assert_eq!(local_l0g_peer_count(&snapshot), 4);
    }

    #[test]
    fn test_local_l0g_peer_count_all_unreachable_is_zero() {
        let snapshot = ClusterSnapshot { layer: Layer::L0g, timestamp: Utc::now(), views: vec![error_view("n1")] };
        assert_eq!(local_l0g_peer_count(&snapshot), 0);
    }
}
