//! Restart procedures, cooldown, and rate limiting.
//!
//! `RestartOrchestrator` is the only thing allowed to touch the command
//! port. It gates every call on cooldown and rate limit before dispatching
//! to the scope-specific procedure, and records exactly one
//! `RestartRecord` per call regardless of outcome — that record is what the
//! next call's gating reads.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use chain_health::ClusterTopology;
use chain_proto::{
    HealthEvent, Layer, Node, RestartOutcome as RecordOutcome, RestartRecord, RestartScope,
    STARTUP_ORDER, STOP_ORDER,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::time::Duration as StdDuration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, Clone)]
pub enum CommandError {
    #[error("ssh to {host} timed out after {timeout_secs}s")]
    Timeout { host: String, timeout_secs: u64 },
    #[error("command on {host} failed: {message}")]
    Failed { host: String, message: String },
}

/// The three remote operations a restart procedure composes. Implementors
/// own the transport (SSH, or a logging-only dry run) and the command
/// template for each operation.
#[async_trait]
pub trait CommandPort: Send + Sync {
    async fn stop(&self, node: &Node, layer: Layer) -> Result<(), CommandError>;
    async fn start_genesis(&self, node: &Node, layer: Layer) -> Result<(), CommandError>;
    async fn start_and_join(&self, node: &Node, layer: Layer, seed_host: &str) -> Result<(), CommandError>;
}

/// Logs the command that would have run and returns success immediately.
/// Satisfies the dry-run mode in spec.md §6.2 without a real transport.
#[derive(Debug, Default)]
pub struct DryRunCommandPort;

#[async_trait]
impl CommandPort for DryRunCommandPort {
    async fn stop(&self, node: &Node, layer: Layer) -> Result<(), CommandError> {
        info!(node = %node.id, host = %node.host, %layer, "dry-run: would stop layer");
        Ok(())
    }

    async fn start_genesis(&self, node: &Node, layer: Layer) -> Result<(), CommandError> {
        info!(node = %node.id, host = %node.host, %layer, "dry-run: would start layer as genesis");
        Ok(())
    }

    async fn start_and_join(&self, node: &Node, layer: Layer, seed_host: &str) -> Result<(), CommandError> {
        info!(node = %node.id, host = %node.host, %layer, seed_host, "dry-run: would start layer and join seed");
        Ok(())
    }
}

/// Shells out over SSH to a remote `chainctl`-style control script.
#[derive(Debug, Clone)]
pub struct ShellCommandPort {
    pub key_path: String,
    pub user: String,
    pub timeout: StdDuration,
}

impl ShellCommandPort {
    pub fn new(key_path: String, user: String, timeout: StdDuration) -> Self {
        Self { key_path, user, timeout }
    }

    async fn run(&self, host: &str, remote_command: String) -> Result<(), CommandError> {
        let mut cmd = tokio::process::Command::new("ssh");
        cmd.arg("-i")
            .arg(&self.key_path)
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.timeout.as_secs()))
            .arg(format!("{}@{}", self.user, host))
            .arg(&remote_command);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| CommandError::Timeout { host: host.to_string(), timeout_secs: self.timeout.as_secs() })?
            .map_err(|e| CommandError::Failed { host: host.to_string(), message: e.to_string() })?;

        if !output.status.success() {
            return Err(CommandError::Failed {
                host: host.to_string(),
                message: format!(
                    "exit {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CommandPort for ShellCommandPort {
    async fn stop(&self, node: &Node, layer: Layer) -> Result<(), CommandError> {
        self.run(&node.host, format!("chainctl stop {layer}")).await
    }

    async fn start_genesis(&self, node: &Node, layer: Layer) -> Result<(), CommandError> {
        self.run(&node.host, format!("chainctl start {layer} --genesis")).await
    }

    async fn start_and_join(&self, node: &Node, layer: Layer, seed_host: &str) -> Result<(), CommandError> {
        self.run(&node.host, format!("chainctl start {layer} --join {seed_host}")).await
    }
}

// ─── Orchestrator ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Restarted,
    Skipped(String),
    Failed(String),
}

pub struct RestartOrchestrator<C> {
    command_port: C,
    history: VecDeque<RestartRecord>,
    cooldown: ChronoDuration,
    max_restarts_per_hour: u32,
    retention: ChronoDuration,
    now: fn() -> DateTime<Utc>,
}

impl<C: CommandPort> RestartOrchestrator<C> {
    pub fn new(command_port: C, cooldown_minutes: i64, max_restarts_per_hour: u32) -> Self {
        Self::with_clock(command_port, cooldown_minutes, max_restarts_per_hour, Utc::now)
    }

    /// Construct with an injected clock, for deterministic cooldown/rate-limit tests.
    pub fn with_clock(
        command_port: C,
        cooldown_minutes: i64,
        max_restarts_per_hour: u32,
        now: fn() -> DateTime<Utc>,
    ) -> Self {
        let retention = ChronoDuration::hours(1) + ChronoDuration::minutes(cooldown_minutes.max(0));
        Self {
            command_port,
            history: VecDeque::new(),
            cooldown: ChronoDuration::minutes(cooldown_minutes),
            max_restarts_per_hour,
            retention,
            now,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now)()
    }

    fn evict_expired(&mut self) {
        let now = self.now();
        let retention = self.retention;
        self.history.retain(|r| now - r.started_at < retention);
    }

    fn cooldown_remaining(&self) -> bool {
        self.history
            .iter()
            .rev()
            .find_map(|r| r.finished_at)
            .map(|finished| self.now() - finished < self.cooldown)
            .unwrap_or(false)
    }

    fn rate_limit_reached(&self) -> bool {
        let one_hour = ChronoDuration::hours(1);
        let now = self.now();
        let count = self.history.iter().filter(|r| now - r.started_at < one_hour).count();
        count as u32 >= self.max_restarts_per_hour
    }

    /// At most one restart of any scope runs at a time, process-wide
    /// (invariant 5) — enforced simply by `&mut self`: there is exactly one
    /// orchestrator instance and this call can't re-enter while awaiting.
    pub async fn execute(&mut self, event: &HealthEvent, topology: &ClusterTopology) -> Outcome {
        self.evict_expired();

        if event.suggested_action == RestartScope::None {
            return Outcome::Skipped("not-actionable".to_string());
        }
        if self.cooldown_remaining() {
            return Outcome::Skipped("cooldown".to_string());
        }
        if self.rate_limit_reached() {
            return Outcome::Skipped("rate-limit".to_string());
        }

        let started_at = self.now();
        let (executed_scope, outcome) = match event.suggested_action {
            RestartScope::None => unreachable!("handled above"),
            RestartScope::IndividualNode => self.run_individual_node(event, topology).await,
            RestartScope::FullLayer => (RestartScope::FullLayer, self.run_full_layer(event, topology).await),
            RestartScope::FullMetagraph => (RestartScope::FullMetagraph, self.run_full_metagraph(topology).await),
        };
        let finished_at = self.now();

        let record_outcome = match &outcome {
            Outcome::Restarted => RecordOutcome::Success,
            Outcome::Failed(_) => RecordOutcome::Failed,
            Outcome::Skipped(_) => RecordOutcome::Skipped,
        };

        self.history.push_back(RestartRecord {
            scope: executed_scope,
            layer: event.layer,
            node_ids: event.node_ids.clone(),
            started_at,
            finished_at: Some(finished_at),
            outcome: record_outcome,
        });

        if let Outcome::Failed(ref reason) = outcome {
            warn!(condition = ?event.condition, layer = ?event.layer, reason, "restart procedure failed");
        }

        outcome
    }

    async fn stop_layer_all(&self, layer: Layer, topology: &ClusterTopology, settle: StdDuration) -> Result<(), String> {
        let results = futures_util::future::join_all(
            topology.nodes().iter().map(|n| self.command_port.stop(n, layer)),
        )
        .await;
        for result in results {
            result.map_err(|e| e.to_string())?;
        }
        tokio::time::sleep(settle).await;
        Ok(())
    }

    async fn start_genesis_then_join(&self, layer: Layer, topology: &ClusterTopology) -> Result<(), String> {
        let genesis = topology.genesis();
        self.command_port
            .start_genesis(genesis, layer)
            .await
            .map_err(|e| e.to_string())?;
        tokio::time::sleep(StdDuration::from_secs(30)).await;

        for node in topology.nodes().iter().skip(1) {
            self.command_port
                .start_and_join(node, layer, &genesis.host)
                .await
                .map_err(|e| e.to_string())?;
            tokio::time::sleep(StdDuration::from_secs(10)).await;
        }
        Ok(())
    }

    async fn full_layer_procedure(&self, layer: Layer, topology: &ClusterTopology) -> Outcome {
        if let Err(e) = self.stop_layer_all(layer, topology, StdDuration::from_secs(5)).await {
            return Outcome::Failed(e);
        }
        match self.start_genesis_then_join(layer, topology).await {
            Ok(()) => Outcome::Restarted,
            Err(e) => Outcome::Failed(e),
        }
    }

    /// For each target, pick the lowest-id node outside the affected set as
    /// seed. If a target has no eligible seed, the whole call is downgraded
    /// to a full-layer restart (spec §4.7).
    async fn run_individual_node(&self, event: &HealthEvent, topology: &ClusterTopology) -> (RestartScope, Outcome) {
        let layer = match event.layer {
            Some(l) => l,
            None => return (RestartScope::IndividualNode, Outcome::Failed("individual-node restart requires a layer".to_string())),
        };

        for target_id in &event.node_ids {
            let target = match topology.find(target_id) {
                Some(n) => n,
                None => continue,
            };
            let seed = topology
                .nodes()
                .iter()
                .filter(|n| n.id != *target_id && !event.node_ids.contains(&n.id))
                .min_by(|a, b| a.id.cmp(&b.id));

            let seed = match seed {
                Some(s) => s,
                None => {
                    warn!(node = %target_id, %layer, "no seed available for individual restart, downgrading to full layer");
                    return (RestartScope::FullLayer, self.full_layer_procedure(layer, topology).await);
                }
            };

            if let Err(e) = self.command_port.stop(target, layer).await {
                return (RestartScope::IndividualNode, Outcome::Failed(e.to_string()));
            }
            tokio::time::sleep(StdDuration::from_secs(5)).await;
            if let Err(e) = self.command_port.start_and_join(target, layer, &seed.host).await {
                return (RestartScope::IndividualNode, Outcome::Failed(e.to_string()));
            }
            tokio::time::sleep(StdDuration::from_secs(15)).await;
        }

        (RestartScope::IndividualNode, Outcome::Restarted)
    }

    async fn run_full_layer(&self, event: &HealthEvent, topology: &ClusterTopology) -> Outcome {
        match event.layer {
            Some(layer) => self.full_layer_procedure(layer, topology).await,
            None => Outcome::Failed("full-layer restart requires a layer".to_string()),
        }
    }

    async fn run_full_metagraph(&self, topology: &ClusterTopology) -> Outcome {
        for layer in STOP_ORDER {
            if let Err(e) = self.stop_layer_all(layer, topology, StdDuration::from_secs(3)).await {
                return Outcome::Failed(e);
            }
        }

        for layer in STARTUP_ORDER {
            if let Err(e) = self.start_genesis_then_join(layer, topology).await {
                return Outcome::Failed(e);
            }
            tokio::time::sleep(StdDuration::from_secs(20)).await;
        }

        Outcome::Restarted
    }
}
