//! chainmon — centralized health monitor and restart controller for a chain fleet.
//!
//! Loads cluster topology and thresholds from the environment, then either
//! runs a single detect-and-maybe-restart tick (`--once`, the default) or
//! loops on `CHAINMON_HEALTH_CHECK_INTERVAL_SECONDS` until signaled
//! (`--daemon`).

use chain_health::{ClusterTopology, ConditionEngine};
use chain_orchestrator::{CommandPort, DryRunCommandPort, RestartOrchestrator, ShellCommandPort};
use chain_probe::NodeApiClient;
use chainmon::notifier::{LoggingNotifier, Notifier, WebhookNotifier};
use chainmon::{MonitorConfig, MonitorLoop};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "chainmon")]
#[command(about = "Health monitor and automated recovery controller for a chain fleet")]
#[command(version)]
struct Cli {
    /// Run continuously, ticking on CHAINMON_HEALTH_CHECK_INTERVAL_SECONDS.
    #[arg(long, conflicts_with = "once")]
    daemon: bool,

    /// Run a single check and exit (default).
    #[arg(long)]
    once: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("chainmon=info".parse().expect("static directive parses")))
        .init();

    let cli = Cli::parse();

    let config = match MonitorConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "fatal startup error loading configuration");
            return ExitCode::FAILURE;
        }
    };

    let topology = match ClusterTopology::new(config.nodes.clone()) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "fatal startup error building cluster topology");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let daemon = cli.daemon && !cli.once;
    runtime.block_on(run(config, topology, daemon))
}

async fn run(config: MonitorConfig, topology: ClusterTopology, daemon: bool) -> ExitCode {
    info!(
        nodes = topology.nodes().len(),
        dry_run = config.dry_run,
        interval_secs = config.health_check_interval_seconds,
        daemon,
        "starting chainmon"
    );

    let topology = Arc::new(topology);
    let api_client = Arc::new(NodeApiClient::new());
    let engine = ConditionEngine::new(
        Arc::clone(&topology),
        api_client,
        config.snapshot_stall_minutes * 60,
    );

    let notifier: Box<dyn Notifier> = match &config.notifier_webhook_url {
        Some(url) => Box::new(WebhookNotifier::new(url.clone())),
        None => Box::new(LoggingNotifier),
    };

    if config.dry_run {
        let orchestrator = RestartOrchestrator::new(
            DryRunCommandPort,
            config.restart_cooldown_minutes,
            config.max_restarts_per_hour,
        );
        run_with_orchestrator(engine, orchestrator, notifier, topology, &config, daemon).await
    } else {
        let command_port = ShellCommandPort::new(
            config.ssh_key_path.clone(),
            config.ssh_user.clone(),
            Duration::from_secs(config.ssh_timeout_secs),
        );
        let orchestrator = RestartOrchestrator::new(
            command_port,
            config.restart_cooldown_minutes,
            config.max_restarts_per_hour,
        );
        run_with_orchestrator(engine, orchestrator, notifier, topology, &config, daemon).await
    }
}

async fn run_with_orchestrator<S, C>(
    engine: ConditionEngine<S>,
    orchestrator: RestartOrchestrator<C>,
    notifier: Box<dyn Notifier>,
    topology: Arc<ClusterTopology>,
    config: &MonitorConfig,
    daemon: bool,
) -> ExitCode
where
    S: chain_probe::ClusterSource + chain_probe::OrdinalSource + chain_probe::NodeInfoSource + 'static,
    C: CommandPort,
{
    let interval = Duration::from_secs(config.health_check_interval_seconds);
    let mut monitor = MonitorLoop::with_hypergraph(
        engine,
        orchestrator,
        notifier,
        topology,
        interval,
        config.hypergraph.clone(),
    );

    if !daemon {
        let summary = monitor.tick().await;
        info!(duration_ms = summary.duration.as_millis() as u64, condition = ?summary.condition, "one-shot check complete");
        return ExitCode::SUCCESS;
    }

    let shutdown = monitor.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            shutdown.notify_one();
        }
    });

    monitor.run().await;
    ExitCode::SUCCESS
}
