//! Process-local operational metrics for the monitor loop.
//!
//! Provides:
//! - [`OperationsMetrics`] — atomic counters for ticks, conditions, and restarts
//! - [`MetricsExporter`] — Prometheus text format export

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

// ─────────────────────────────────────────────────────────────
// Atomic Counter
// ─────────────────────────────────────────────────────────────

/// A thread-safe u64 counter backed by an atomic.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Increment the counter by one.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Read the current counter value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

// ─────────────────────────────────────────────────────────────
// Operations Metrics
// ─────────────────────────────────────────────────────────────

/// Atomic operation counters for the monitor loop.
///
/// All counters are thread-safe and can be shared via [`std::sync::Arc`].
///
/// # Example
/// ```rust
/// # use chain_observe::OperationsMetrics;
/// # use std::sync::Arc;
/// let metrics = Arc::new(OperationsMetrics::new());
/// metrics.ticks_total.inc();
/// assert_eq!(metrics.ticks_total.get(), 1);
/// ```
#[derive(Debug, Default)]
pub struct OperationsMetrics {
    /// Total monitor ticks completed.
    pub ticks_total: Counter,
    /// Ticks that detected a fork.
    pub forks_detected: Counter,
    /// Ticks that detected a cluster-wide snapshot stall.
    pub stalls_detected: Counter,
    /// Ticks that detected unreachable/unhealthy nodes.
    pub unhealthy_detected: Counter,
    /// Hypergraph-health checks that reported a possible disconnect.
    pub hypergraph_alerts: Counter,
    /// Total restart procedures attempted by the orchestrator.
    pub restarts_attempted: Counter,
    /// Restart procedures that completed successfully.
    pub restarts_succeeded: Counter,
    /// Restart procedures that failed mid-way.
    pub restarts_failed: Counter,
    /// Restart requests skipped due to cooldown.
    pub restarts_skipped_cooldown: Counter,
    /// Restart requests skipped due to the hourly rate limit.
    pub restarts_skipped_rate_limit: Counter,
    /// Notifier delivery failures (logged, never fatal).
    pub notifier_failures: Counter,
}

impl OperationsMetrics {
    /// Create a new zeroed metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed tick.
    pub fn record_tick(&self) {
        self.ticks_total.inc();
    }

    /// Record a detected fork.
    pub fn record_fork_detected(&self) {
        self.forks_detected.inc();
        warn!(counter = "forks_detected", value = self.forks_detected.get(), "fork detected");
    }

    /// Record a detected cluster-wide stall.
    pub fn record_stall_detected(&self) {
        self.stalls_detected.inc();
        warn!(counter = "stalls_detected", value = self.stalls_detected.get(), "snapshot stall detected");
    }

    /// Record a detected unhealthy-node condition.
    pub fn record_unhealthy_detected(&self) {
        self.unhealthy_detected.inc();
        warn!(counter = "unhealthy_detected", value = self.unhealthy_detected.get(), "unhealthy nodes detected");
    }

    /// Record a hypergraph-health alert. Never actionable, logged for visibility only.
    pub fn record_hypergraph_alert(&self) {
        self.hypergraph_alerts.inc();
        info!(counter = "hypergraph_alerts", value = self.hypergraph_alerts.get(), "hypergraph health alert");
    }

    /// Record a restart attempt. Call before dispatching to the command port.
    pub fn record_restart_attempt(&self) {
        self.restarts_attempted.inc();
        info!(counter = "restarts_attempted", value = self.restarts_attempted.get(), "restart attempted");
    }

    /// Record a successful restart.
    pub fn record_restart_success(&self) {
        self.restarts_succeeded.inc();
        info!(counter = "restarts_succeeded", value = self.restarts_succeeded.get(), "restart succeeded");
    }

    /// Record a failed restart.
    pub fn record_restart_failure(&self) {
        self.restarts_failed.inc();
        warn!(counter = "restarts_failed", value = self.restarts_failed.get(), "restart failed");
    }

    /// Record a restart skipped due to cooldown.
    pub fn record_restart_skipped_cooldown(&self) {
        self.restarts_skipped_cooldown.inc();
    }

    /// Record a restart skipped due to the rate limit.
    pub fn record_restart_skipped_rate_limit(&self) {
        self.restarts_skipped_rate_limit.inc();
    }

    /// Record a notifier delivery failure.
    pub fn record_notifier_failure(&self) {
        self.notifier_failures.inc();
        warn!(counter = "notifier_failures", value = self.notifier_failures.get(), "notifier delivery failed");
    }
}

// ─────────────────────────────────────────────────────────────
// Metrics Exporter (Prometheus text format)
// ─────────────────────────────────────────────────────────────

/// Exports [`OperationsMetrics`] in Prometheus text format.
pub struct MetricsExporter {
    metrics: std::sync::Arc<OperationsMetrics>,
    /// Label prefix added to all metric names (default: `chainmon`).
    prefix: String,
}

impl MetricsExporter {
    /// Create a new exporter wrapping the given metrics.
    pub fn new(metrics: std::sync::Arc<OperationsMetrics>) -> Self {
        Self { metrics, prefix: "chainmon".to_string() }
    }

    /// Create with a custom metric name prefix.
    pub fn with_prefix(metrics: std::sync::Arc<OperationsMetrics>, prefix: impl Into<String>) -> Self {
        Self { metrics, prefix: prefix.into() }
    }

    /// Render all metrics as a Prometheus text format string.
    ///
    /// Each metric is rendered with `# HELP`, `# TYPE`, and value lines.
    pub fn render(&self) -> String {
        let m = &self.metrics;
        let p = &self.prefix;
        let mut out = String::new();

        self.write_counter(&mut out, p, "ticks_total", "Total monitor ticks completed", m.ticks_total.get());
        self.write_counter(&mut out, p, "forks_detected", "Total ticks that detected a fork", m.forks_detected.get());
        self.write_counter(&mut out, p, "stalls_detected", "Total ticks that detected a cluster-wide stall", m.stalls_detected.get());
        self.write_counter(&mut out, p, "unhealthy_detected", "Total ticks that detected unhealthy nodes", m.unhealthy_detected.get());
        self.write_counter(&mut out, p, "hypergraph_alerts", "Total hypergraph-health alerts raised", m.hypergraph_alerts.get());
        self.write_counter(&mut out, p, "restarts_attempted", "Total restart procedures attempted", m.restarts_attempted.get());
        self.write_counter(&mut out, p, "restarts_succeeded", "Total restart procedures that succeeded", m.restarts_succeeded.get());
        self.write_counter(&mut out, p, "restarts_failed", "Total restart procedures that failed", m.restarts_failed.get());
        self.write_counter(&mut out, p, "restarts_skipped_cooldown", "Total restarts skipped due to cooldown", m.restarts_skipped_cooldown.get());
        self.write_counter(&mut out, p, "restarts_skipped_rate_limit", "Total restarts skipped due to rate limit", m.restarts_skipped_rate_limit.get());
        self.write_counter(&mut out, p, "notifier_failures", "Total notifier delivery failures", m.notifier_failures.get());

        out
    }

    fn write_counter(&self, out: &mut String, prefix: &str, name: &str, help: &str, value: u64) {
        out.push_str(&format!("# HELP {prefix}_{name} {help}\n"));
        out.push_str(&format!("# TYPE {prefix}_{name} counter\n"));
        out.push_str(&format!("{prefix}_{name} {value}\n\n"));
    }
}
