//! Connectivity - external signal consumed by the connectivity barrier

use serde::{Deserialize, Serialize};

use crate::StateStream;

/// Kind of network a connection goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    Unknown,
}

/// Device connectivity status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityStatus {
    /// Not determined yet, or about to be lost
    Unknown,
    NotConnected,
    Connected(ConnectionType),
}

impl ConnectivityStatus {
    /// True only for a known, live connection
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

/// Provider of connectivity status
pub trait Connectivity: Send + Sync {
    /// Live status; replays the latest known status to new subscribers
    fn status(&self) -> StateStream<ConnectivityStatus>;
}
