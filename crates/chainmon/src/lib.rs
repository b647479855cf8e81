//! chainmon — chain fleet health monitor and restart controller.
//!
//! Wires the detection layer (`chain-health`), the restart layer
//! (`chain-orchestrator`), and a notification port together into a single
//! tick loop. The binary (`main.rs`) owns process startup; this crate owns
//! the loop itself so it can be driven directly from tests.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod notifier;

use chain_health::{check_hypergraph_health, local_l0g_peer_count, ClusterTopology, ConditionEngine};
use chain_observe::OperationsMetrics;
use chain_orchestrator::{CommandPort, Outcome, RestartOrchestrator};
use chain_probe::{ClusterSource, NodeInfoSource, OrdinalSource};
use chain_proto::{Condition, Layer};
use notifier::Notifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

pub use config::{HypergraphConfig, MonitorConfig};
pub use error::{ConfigError, MonitorError, MonitorResult};

/// Outcome of a single tick, reported to the caller for logging/metrics —
/// the loop itself never inspects this beyond deciding whether to log.
#[derive(Debug, Clone)]
pub struct MonitorTickSummary {
    pub duration: Duration,
    pub condition: Option<Condition>,
    pub restart_outcome: Option<Outcome>,
}

impl MonitorTickSummary {
    fn healthy(duration: Duration) -> Self {
        Self { duration, condition: None, restart_outcome: None }
    }
}

/// Owns the condition engine, the restart orchestrator, and the notifier,
/// and sequences one tick: detect, then — if something actionable surfaced —
/// hand it to the orchestrator and notify on the result.
pub struct MonitorLoop<S, C, N> {
    engine: ConditionEngine<S>,
    orchestrator: RestartOrchestrator<C>,
    notifier: N,
    topology: Arc<ClusterTopology>,
    interval: Duration,
    shutdown: Arc<Notify>,
    metrics: Arc<OperationsMetrics>,
    hypergraph: HypergraphConfig,
    tick_count: u64,
}

impl<S, C, N> MonitorLoop<S, C, N>
where
    S: ClusterSource + OrdinalSource + NodeInfoSource + 'static,
    C: CommandPort,
    N: Notifier,
{
    pub fn new(
        engine: ConditionEngine<S>,
        orchestrator: RestartOrchestrator<C>,
        notifier: N,
        topology: Arc<ClusterTopology>,
        interval: Duration,
    ) -> Self {
        Self::with_hypergraph(engine, orchestrator, notifier, topology, interval, HypergraphConfig::default())
    }

    /// Like [`MonitorLoop::new`], but also wiring in the best-effort,
    /// never-actuating external-hypergraph check (spec.md §6.5's optional
    /// block). Runs on its own cadence — every `check_interval_multiplier`
    /// ticks — independent of the fork/stall/unhealthy priority chain.
    pub fn with_hypergraph(
        engine: ConditionEngine<S>,
        orchestrator: RestartOrchestrator<C>,
        notifier: N,
        topology: Arc<ClusterTopology>,
        interval: Duration,
        hypergraph: HypergraphConfig,
    ) -> Self {
        Self {
            engine,
            orchestrator,
            notifier,
            topology,
            interval,
            shutdown: Arc::new(Notify::new()),
            metrics: Arc::new(OperationsMetrics::new()),
            hypergraph,
            tick_count: 0,
        }
    }

    /// A handle that, when notified, stops the loop after its current tick
    /// finishes — in-flight restart procedures are never aborted mid-way.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Shared counters for this loop's ticks and restarts. Clone the `Arc`
    /// to render it elsewhere (e.g. a `/metrics` scrape handler) while the
    /// loop keeps running.
    pub fn metrics(&self) -> Arc<OperationsMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Best-effort external-hypergraph connectivity check (spec.md §6.5,
    /// §9 Open Question). Runs on its own cadence, never actuates, and is
    /// reported through the notifier directly rather than the orchestrator
    /// since `suggested_action` is always `RestartScope::None`.
    async fn check_hypergraph(&mut self) {
        if !self.hypergraph.enabled {
            return;
        }
        self.tick_count += 1;
        let multiplier = self.hypergraph.check_interval_multiplier.max(1) as u64;
        if self.tick_count % multiplier != 0 {
            return;
        }

        let snapshot = self.engine.fetch_layer_snapshot(Layer::L0g).await;
        let peer_count = local_l0g_peer_count(&snapshot);
        let local_node_count = self.engine.local_node_count();

        if let Some(event) = check_hypergraph_health(peer_count, local_node_count) {
            info!(peer_count, local_node_count, "hypergraph health alert");
            self.metrics.record_hypergraph_alert();
            let outcome = Outcome::Skipped("not-actionable".to_string());
            if let Err(e) = self.notifier.notify(&event, &outcome).await {
                self.metrics.record_notifier_failure();
                warn!(error = %e, "notifier delivery failed for hypergraph alert");
            }
        }
    }

    /// Run one detect-then-maybe-restart cycle.
    pub async fn tick(&mut self) -> MonitorTickSummary {
        let started = std::time::Instant::now();
        self.metrics.record_tick();
        self.check_hypergraph().await;

        let event = match self.engine.run_tick().await {
            Some(event) => event,
            None => return MonitorTickSummary::healthy(started.elapsed()),
        };

        info!(condition = ?event.condition, layer = ?event.layer, description = %event.description, "condition detected");
        match event.condition {
            Condition::ForkDetected => self.metrics.record_fork_detected(),
            Condition::SnapshotStall => self.metrics.record_stall_detected(),
            Condition::NodeUnreachable => self.metrics.record_unhealthy_detected(),
            Condition::HypergraphHealth => self.metrics.record_hypergraph_alert(),
            Condition::Healthy => {}
        }

        if !event.is_actionable() {
            return MonitorTickSummary {
                duration: started.elapsed(),
                condition: Some(event.condition),
                restart_outcome: None,
            };
        }

        self.metrics.record_restart_attempt();
        let outcome = self.orchestrator.execute(&event, &self.topology).await;
        match &outcome {
            Outcome::Restarted => self.metrics.record_restart_success(),
            Outcome::Failed(_) => self.metrics.record_restart_failure(),
            Outcome::Skipped(reason) if reason == "cooldown" => self.metrics.record_restart_skipped_cooldown(),
            Outcome::Skipped(reason) if reason == "rate-limit" => self.metrics.record_restart_skipped_rate_limit(),
            Outcome::Skipped(_) => {}
        }

        if let Err(e) = self.notifier.notify(&event, &outcome).await {
            self.metrics.record_notifier_failure();
            warn!(error = %e, "notifier delivery failed");
        }

        MonitorTickSummary {
            duration: started.elapsed(),
            condition: Some(event.condition),
            restart_outcome: Some(outcome),
        }
    }

    /// Run ticks on a fixed interval until `shutdown_handle()` is notified.
    /// Used for `--daemon`; `--once` calls [`MonitorLoop::tick`] directly.
    pub async fn run(&mut self) {
        loop {
            let summary = self.tick().await;
            info!(duration_ms = summary.duration.as_millis() as u64, condition = ?summary.condition, "tick complete");

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.notified() => {
                    info!("shutdown requested, stopping monitor loop");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chain_orchestrator::{DryRunCommandPort, RestartOrchestrator};
    use chain_probe::ProbeError;
    use chain_proto::{ClusterPeer, Node, NodeClusterView, NodeInfo};
    use notifier::LoggingNotifier;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FakeSource {
        ordinal: AtomicI64,
    }

    fn peer(id: &str) -> ClusterPeer {
        ClusterPeer { id: id.to_string(), state: "Ready".to_string(), host: None, public_port: None, p2p_port: None }
    }

    #[async_trait]
    impl ClusterSource for FakeSource {
        async fn get_cluster(&self, node: &Node, layer: Layer) -> NodeClusterView {
            // L0g is under-reported relative to the local node count, which
            // is exactly the disconnect signal `check_hypergraph_health` looks for.
            let peers = if layer == Layer::L0g { vec![peer("p1")] } else { vec![peer("p1"), peer("p2")] };
            NodeClusterView::healthy(node.id.clone(), layer, peers, chrono::Utc::now())
        }
    }

    #[async_trait]
    impl OrdinalSource for FakeSource {
        async fn get_ordinal(&self, _node: &Node, _layer: Layer) -> i64 {
            self.ordinal.fetch_add(1, Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NodeInfoSource for FakeSource {
        async fn get_node_info_checked(&self, _node: &Node, _layer: Layer) -> Result<NodeInfo, ProbeError> {
            Ok(NodeInfo {
                state: "Ready".to_string(),
                id: None,
                host: None,
                public_port: None,
                p2p_port: None,
                snapshot_ordinal: None,
                last_snapshot_ordinal: None,
            })
        }
    }

    fn node(id: &str) -> Node {
        Node { id: id.to_string(), host: format!("{id}.cluster.test"), layers: HashMap::new() }
    }

    fn topology() -> Arc<ClusterTopology> {
        Arc::new(ClusterTopology::new(vec![node("n1"), node("n2")]).expect("valid topology"))
    }

    #[tokio::test]
    async fn hypergraph_check_fires_only_every_nth_tick() {
        let topo = topology();
        let source = Arc::new(FakeSource { ordinal: AtomicI64::new(0) });
        let engine = ConditionEngine::new(Arc::clone(&topo), source, 3600);
        let orchestrator = RestartOrchestrator::new(DryRunCommandPort, 10, 6);
        let hypergraph = HypergraphConfig { enabled: true, urls: vec![], check_interval_multiplier: 2 };

        let mut monitor =
            MonitorLoop::with_hypergraph(engine, orchestrator, LoggingNotifier, topo, Duration::from_secs(60), hypergraph);

        let first = monitor.tick().await;
        assert!(first.condition.is_none(), "fork/stall/unhealthy detectors should stay quiet");
        assert_eq!(monitor.metrics().hypergraph_alerts.get(), 0, "first tick is not a multiple of the interval");

        let second = monitor.tick().await;
        assert!(second.condition.is_none());
        assert_eq!(monitor.metrics().hypergraph_alerts.get(), 1, "second tick completes the interval multiplier");
    }

    #[tokio::test]
    async fn hypergraph_check_disabled_by_default() {
        let topo = topology();
        let source = Arc::new(FakeSource { ordinal: AtomicI64::new(0) });
        let engine = ConditionEngine::new(Arc::clone(&topo), source, 3600);
        let orchestrator = RestartOrchestrator::new(DryRunCommandPort, 10, 6);

        let mut monitor = MonitorLoop::new(engine, orchestrator, LoggingNotifier, topo, Duration::from_secs(60));
        for _ in 0..4 {
            monitor.tick().await;
        }
        assert_eq!(monitor.metrics().hypergraph_alerts.get(), 0);
    }
}
