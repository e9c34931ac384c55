//! SdkBlueprint - Config Loader output
//!
//! Describes one SDK instance: storage, drain coordination, connectivity source,
//! barrier settings and the dispatchers to run.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use crate::{BarrierConfiguration, BarrierScope, BarrierSettings};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete SDK configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Dispatch storage
    #[serde(default)]
    pub store: StoreConfig,

    /// Drain coordination
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Connectivity source for the connectivity barrier
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    /// Barrier settings, keyed by barrier id
    #[serde(default)]
    pub barriers: Vec<BarrierConfig>,

    /// Dispatchers to run
    pub dispatchers: Vec<DispatcherConfig>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Maximum queued Dispatches (-1 = unbounded)
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: i64,

    /// Seconds a Dispatch may stay queued
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_queue_size: default_max_queue_size(),
            expiration_secs: default_expiration_secs(),
        }
    }
}

impl StoreConfig {
    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs)
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("beacon.db")
}

fn default_max_queue_size() -> i64 {
    100
}

fn default_expiration_secs() -> u64 {
    86_400
}

/// Drain coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Maximum Dispatches in flight per consumer
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_max_in_flight() -> usize {
    50
}

/// Where connectivity status comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityMode {
    /// Always report a connection
    #[default]
    Always,
    /// Periodically open a TCP connection to a probe endpoint
    Probe,
}

/// Connectivity source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    #[serde(default)]
    pub mode: ConnectivityMode,

    /// Probe host
    #[serde(default = "default_probe_host")]
    pub probe_host: String,

    /// Probe port
    #[serde(default = "default_probe_port")]
    pub probe_port: u16,

    /// Milliseconds between probes
    #[serde(default = "default_probe_interval_ms")]
    pub interval_ms: u64,

    /// Milliseconds before a probe counts as failed
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            mode: ConnectivityMode::default(),
            probe_host: default_probe_host(),
            probe_port: default_probe_port(),
            interval_ms: default_probe_interval_ms(),
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

fn default_probe_host() -> String {
    "1.1.1.1".to_string()
}

fn default_probe_port() -> u16 {
    443
}

fn default_probe_interval_ms() -> u64 {
    5_000
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

/// Settings for one barrier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarrierConfig {
    /// Barrier id (e.g. "BatchingBarrier")
    pub id: String,

    /// Scopes override (`"all"` or dispatcher names)
    #[serde(default)]
    pub scopes: Option<HashSet<BarrierScope>>,

    /// Barrier-specific configuration
    #[serde(default)]
    pub configuration: BarrierConfiguration,
}

impl BarrierConfig {
    pub fn settings(&self) -> BarrierSettings {
        BarrierSettings {
            scopes: self.scopes.clone(),
            configuration: self.configuration.clone(),
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Dispatcher name, also its consumer id
    pub name: String,

    /// Dispatcher kind
    pub kind: DispatcherKind,

    /// Maximum batch size
    #[serde(default = "default_dispatch_limit")]
    pub dispatch_limit: usize,

    /// Kind-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_dispatch_limit() -> usize {
    1
}

/// Dispatcher kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherKind {
    /// Log output
    Log,
    /// JSON-lines file output
    File,
    /// Network collection endpoint
    Collect,
}

impl SdkBlueprint {
    /// Barrier settings keyed by barrier id
    pub fn barrier_settings(&self) -> HashMap<String, BarrierSettings> {
        self.barriers
            .iter()
            .map(|barrier| (barrier.id.clone(), barrier.settings()))
            .collect()
    }

    /// Names of all configured dispatchers
    pub fn dispatcher_names(&self) -> Vec<&str> {
        self.dispatchers.iter().map(|d| d.name.as_str()).collect()
    }
}
