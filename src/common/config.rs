//! Configuration for minilend components

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            storage: StorageConfig::default(),
            dispatch: DispatchConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from an optional `minilend.toml` plus `MINILEND_*`
    /// environment overrides. Falls back to defaults when neither exists.
    pub fn load() -> Self {
        let loaded = config::Config::builder()
            .add_source(config::File::with_name("minilend").required(false))
            .add_source(config::Environment::with_prefix("MINILEND").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize::<Config>());

        match loaded {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config file, using defaults: {}", e);
                Config::default()
            }
        }
    }
}

/// Storage engine configuration (one store + one replica store per site)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the per-site SQLite files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Number of catalog items seeded at first start
    #[serde(default = "default_catalog_size")]
    pub catalog_size: usize,

    /// Initial loans seeded at site 1
    #[serde(default = "default_site1_loans")]
    pub site1_loans: usize,

    /// Initial loans seeded at site 2
    #[serde(default = "default_site2_loans")]
    pub site2_loans: usize,

    /// Capacity of the outbound replication channel; events beyond this are
    /// dropped rather than delaying the commit path
    #[serde(default = "default_replication_buffer")]
    pub replication_buffer: usize,

    /// Capacity of the storage request channel
    #[serde(default = "default_request_buffer")]
    pub request_buffer: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_catalog_size() -> usize {
    1000
}
fn default_site1_loans() -> usize {
    50
}
fn default_site2_loans() -> usize {
    150
}
fn default_replication_buffer() -> usize {
    16
}
fn default_request_buffer() -> usize {
    64
}

impl StorageConfig {
    pub fn initial_loans(&self, site_id: crate::common::SiteId) -> usize {
        if site_id == 1 {
            self.site1_loans
        } else {
            self.site2_loans
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            catalog_size: default_catalog_size(),
            site1_loans: default_site1_loans(),
            site2_loans: default_site2_loans(),
            replication_buffer: default_replication_buffer(),
            request_buffer: default_request_buffer(),
        }
    }
}

/// Coordinator (load dispatcher) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Capacity of each broadcast topic
    #[serde(default = "default_topic_buffer")]
    pub topic_buffer: usize,

    /// Capacity of the loan worker's request channel
    #[serde(default = "default_loan_buffer")]
    pub loan_buffer: usize,

    /// Capacity of the dispatcher's inbound request channel
    #[serde(default = "default_request_buffer")]
    pub request_buffer: usize,
}

fn default_topic_buffer() -> usize {
    100
}
fn default_loan_buffer() -> usize {
    32
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            topic_buffer: default_topic_buffer(),
            loan_buffer: default_loan_buffer(),
            request_buffer: default_request_buffer(),
        }
    }
}

/// Failover monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between liveness probes
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Timeout for a single probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Consecutive failures before failover
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

fn default_probe_interval_ms() -> u64 {
    5000
}
fn default_probe_timeout_ms() -> u64 {
    2000
}
fn default_failure_threshold() -> u32 {
    3
}

impl MonitorConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            failure_threshold: default_failure_threshold(),
        }
    }
}
