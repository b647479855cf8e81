//! Environment-variable configuration for the monitor process.
//!
//! Every setting is read under the `CHAINMON_` prefix. There is no config
//! file and no persistence — the process is reconfigured by restarting it
//! with a different environment, which matches how the rest of the fleet
//! tooling is deployed.

use crate::error::{ConfigError, ConfigResult};
use chain_proto::{validate_node_id, Layer, Node, PortSet};
use std::collections::{HashMap, HashSet};
use std::env;

const LAYER_ENV_NAMES: [(Layer, &str); 4] = [
    (Layer::L0g, "L0G"),
    (Layer::L0m, "L0M"),
    (Layer::L1c, "L1C"),
    (Layer::L1d, "L1D"),
];

#[derive(Debug, Clone)]
pub struct HypergraphConfig {
    pub enabled: bool,
    pub urls: Vec<String>,
    pub check_interval_multiplier: u32,
}

impl Default for HypergraphConfig {
    fn default() -> Self {
        Self { enabled: false, urls: Vec::new(), check_interval_multiplier: 5 }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub nodes: Vec<Node>,
    pub snapshot_stall_minutes: i64,
    pub health_check_interval_seconds: u64,
    pub restart_cooldown_minutes: i64,
    pub max_restarts_per_hour: u32,
    pub ssh_key_path: String,
    pub ssh_user: String,
    pub ssh_timeout_secs: u64,
    pub dry_run: bool,
    pub hypergraph: HypergraphConfig,
    pub notifier_webhook_url: Option<String>,
}

impl MonitorConfig {
    pub fn from_env() -> ConfigResult<Self> {
        let nodes = parse_nodes(&require_env("CHAINMON_NODES")?, &parse_layer_ports()?)?;

        Ok(Self {
            nodes,
            snapshot_stall_minutes: parse_i64("CHAINMON_SNAPSHOT_STALL_MINUTES", 4)?,
            health_check_interval_seconds: parse_u64("CHAINMON_HEALTH_CHECK_INTERVAL_SECONDS", 60)?,
            restart_cooldown_minutes: parse_i64("CHAINMON_RESTART_COOLDOWN_MINUTES", 10)?,
            max_restarts_per_hour: parse_u32("CHAINMON_MAX_RESTARTS_PER_HOUR", 6)?,
            ssh_key_path: env::var("CHAINMON_SSH_KEY_PATH").unwrap_or_else(|_| "/etc/chainmon/id_ed25519".to_string()),
            ssh_user: env::var("CHAINMON_SSH_USER").unwrap_or_else(|_| "chainmon".to_string()),
            ssh_timeout_secs: parse_u64("CHAINMON_SSH_TIMEOUT_SECS", 10)?,
            dry_run: parse_bool("CHAINMON_DRY_RUN", false)?,
            hypergraph: parse_hypergraph()?,
            notifier_webhook_url: env::var("CHAINMON_NOTIFIER_WEBHOOK_URL").ok(),
        })
    }
}

fn require_env(key: &str) -> ConfigResult<String> {
    env::var(key).map_err(|_| ConfigError::Missing(key.to_string()))
}

fn parse_i64(key: &str, default: i64) -> ConfigResult<i64> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid { key: key.to_string(), value: v }),
        Err(_) => Ok(default),
    }
}

fn parse_u64(key: &str, default: u64) -> ConfigResult<u64> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid { key: key.to_string(), value: v }),
        Err(_) => Ok(default),
    }
}

fn parse_u32(key: &str, default: u32) -> ConfigResult<u32> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid { key: key.to_string(), value: v }),
        Err(_) => Ok(default),
    }
}

fn parse_u16(key: &str) -> ConfigResult<u16> {
    let v = require_env(key)?;
    v.parse().map_err(|_| ConfigError::Invalid { key: key.to_string(), value: v })
}

fn parse_bool(key: &str, default: bool) -> ConfigResult<bool> {
    match env::var(key) {
        Ok(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid { key: key.to_string(), value: v }),
        },
        Err(_) => Ok(default),
    }
}

/// Reads `CHAINMON_PORT_<LAYER>_{PUBLIC,P2P,CLI}` for each layer. A layer is
/// included only if `..._PUBLIC` is set, in which case the other two ports
/// become required — the same port set is applied to every configured node.
fn parse_layer_ports() -> ConfigResult<HashMap<Layer, PortSet>> {
    let mut ports = HashMap::new();
    for (layer, name) in LAYER_ENV_NAMES {
        let public_key = format!("CHAINMON_PORT_{name}_PUBLIC");
        if env::var(&public_key).is_err() {
            continue;
        }
        let public = parse_u16(&public_key)?;
        let p2p = parse_u16(&format!("CHAINMON_PORT_{name}_P2P"))?;
        let cli = parse_u16(&format!("CHAINMON_PORT_{name}_CLI"))?;
        ports.insert(layer, PortSet { public, p2p, cli });
    }
    Ok(ports)
}

fn parse_nodes(raw: &str, ports: &HashMap<Layer, PortSet>) -> ConfigResult<Vec<Node>> {
    let entries: Vec<&str> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if entries.is_empty() {
        return Err(ConfigError::EmptyNodeList);
    }

    let mut seen = HashSet::new();
    let mut nodes = Vec::with_capacity(entries.len());
    for entry in entries {
        let (id, host) = entry
            .split_once('@')
            .ok_or_else(|| ConfigError::MalformedNodeEntry(entry.to_string()))?;
        if id.is_empty() || host.is_empty() {
            return Err(ConfigError::MalformedNodeEntry(entry.to_string()));
        }
        if !validate_node_id(id) {
            return Err(ConfigError::InvalidNodeId(id.to_string()));
        }
        if !seen.insert(id.to_string()) {
            return Err(ConfigError::DuplicateNodeId(id.to_string()));
        }
        nodes.push(Node { id: id.to_string(), host: host.to_string(), layers: ports.clone() });
    }
    Ok(nodes)
}

fn parse_hypergraph() -> ConfigResult<HypergraphConfig> {
    let enabled = parse_bool("CHAINMON_HYPERGRAPH_ENABLED", false)?;
    let urls = env::var("CHAINMON_HYPERGRAPH_URLS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let check_interval_multiplier = parse_u32("CHAINMON_HYPERGRAPH_CHECK_INTERVAL_MULTIPLIER", 5)?;
    Ok(HypergraphConfig { enabled, urls, check_interval_multiplier })
}
