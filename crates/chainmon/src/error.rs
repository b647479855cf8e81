//! Startup error types. Anything that can fail before the monitor loop
//! starts collapses into [`MonitorError`]; `main` matches on it directly
//! and maps it to the process exit code (spec.md §6.4: 1 on fatal startup
//! error, 0 otherwise).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(String),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },

    #[error("CHAINMON_NODES is empty — at least one node is required")]
    EmptyNodeList,

    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("malformed node entry (expected id@host): {0}")]
    MalformedNodeEntry(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Topology(#[from] chain_health::TopologyError),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
