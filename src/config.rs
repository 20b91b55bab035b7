//! WolfSync Configuration
//!
//! This module provides configuration structures for the durability
//! monitor and the `wolfsync` binary.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::durability::{Level, ReplicationTopology};

/// Main WolfSync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WolfSyncConfig {
    /// Node-specific configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Durability monitor configuration
    #[serde(default)]
    pub durability: DurabilityConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Simulation settings for `wolfsync simulate`
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique id of the active node
    #[serde(default = "default_node_id")]
    pub id: String,
}

/// Durability monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurabilityConfig {
    /// Timeout applied to SyncWrites that do not specify one
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Interval between timeout scans
    #[serde(default = "default_timeout_scan_interval_ms")]
    pub timeout_scan_interval_ms: u64,

    /// Maximum number of replicas per partition
    #[serde(default = "default_max_replicas")]
    pub max_replicas: usize,

    /// Level used when a mutation asks for durability without naming one
    #[serde(default = "default_level")]
    pub default_level: Level,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of partitions to drive
    #[serde(default = "default_partitions")]
    pub partitions: u16,

    /// Replica ids of every partition
    #[serde(default = "default_replicas")]
    pub replicas: Vec<String>,

    /// Mutations per partition
    #[serde(default = "default_writes")]
    pub writes: u64,

    /// Upper bound of the random delay before a replica acknowledges
    #[serde(default = "default_max_ack_delay_ms")]
    pub max_ack_delay_ms: u64,

    /// Fraction of mutations that require durability (0.0 - 1.0)
    #[serde(default = "default_durable_ratio")]
    pub durable_ratio: f64,
}

// Default value functions
fn default_node_id() -> String {
    "active".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_timeout_scan_interval_ms() -> u64 {
    25
}

fn default_max_replicas() -> usize {
    3
}

fn default_level() -> Level {
    Level::Majority
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_partitions() -> u16 {
    1
}

fn default_replicas() -> Vec<String> {
    vec!["replica-1".to_string(), "replica-2".to_string()]
}

fn default_writes() -> u64 {
    1000
}

fn default_max_ack_delay_ms() -> u64 {
    5
}

fn default_durable_ratio() -> f64 {
    1.0
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self { id: default_node_id() }
    }
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            timeout_scan_interval_ms: default_timeout_scan_interval_ms(),
            max_replicas: default_max_replicas(),
            default_level: default_level(),
        }
    }
}

impl DurabilityConfig {
    /// Get default SyncWrite timeout as Duration
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Get timeout scan interval as Duration
    pub fn timeout_scan_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_scan_interval_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            partitions: default_partitions(),
            replicas: default_replicas(),
            writes: default_writes(),
            max_ack_delay_ms: default_max_ack_delay_ms(),
            durable_ratio: default_durable_ratio(),
        }
    }
}

impl SimulationConfig {
    /// Replication topology used by every simulated partition
    pub fn topology(&self) -> ReplicationTopology {
        ReplicationTopology::from_ids(self.replicas.iter().cloned())
    }
}

impl WolfSyncConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfSyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id.is_empty() {
            return Err(crate::Error::Config("node.id cannot be empty".into()));
        }

        if self.durability.default_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "durability.default_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.durability.timeout_scan_interval_ms == 0 {
            return Err(crate::Error::Config(
                "durability.timeout_scan_interval_ms must be greater than 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.simulation.durable_ratio) {
            return Err(crate::Error::Config(
                "simulation.durable_ratio must be between 0.0 and 1.0".into(),
            ));
        }

        if self.simulation.partitions == 0 {
            return Err(crate::Error::Config("simulation.partitions cannot be 0".into()));
        }

        // Surfaces duplicate ids, self-replication and too many replicas
        self.simulation
            .topology()
            .validate(&self.node.id, self.durability.max_replicas)
            .map_err(|e| crate::Error::Config(format!("simulation.replicas: {}", e)))?;

        Ok(())
    }
}
