//! Connectivity sources

use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ConnectionType, Connectivity, ConnectivityConfig, ConnectivityMode, ConnectivityStatus,
    StateCell, StateStream,
};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Connectivity set by the host application (or a test)
#[derive(Debug)]
pub struct ManualConnectivity {
    status: StateCell<ConnectivityStatus>,
}

impl ManualConnectivity {
    /// No status yet; the connectivity barrier stays silent until [`Self::set`]
    pub fn new() -> Self {
        Self {
            status: StateCell::empty(),
        }
    }

    pub fn with_status(status: ConnectivityStatus) -> Self {
        Self {
            status: StateCell::new(status),
        }
    }

    pub fn set(&self, status: ConnectivityStatus) {
        if self.status.set(status) {
            debug!(?status, "connectivity changed");
        }
    }

    pub fn current(&self) -> Option<ConnectivityStatus> {
        self.status.get()
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new()
    }
}

impl Connectivity for ManualConnectivity {
    fn status(&self) -> StateStream<ConnectivityStatus> {
        self.status.subscribe()
    }
}

/// Always connected (hosts without a network signal, e.g. servers)
#[derive(Debug)]
pub struct AlwaysConnected {
    status: StateCell<ConnectivityStatus>,
}

impl AlwaysConnected {
    pub fn new() -> Self {
        Self {
            status: StateCell::new(ConnectivityStatus::Connected(ConnectionType::Ethernet)),
        }
    }
}

impl Default for AlwaysConnected {
    fn default() -> Self {
        Self::new()
    }
}

impl Connectivity for AlwaysConnected {
    fn status(&self) -> StateStream<ConnectivityStatus> {
        self.status.subscribe()
    }
}

/// Periodic TCP reachability probe
///
/// Reports `Connected(Unknown)` while the probe endpoint accepts connections and
/// `NotConnected` otherwise. Starts out `Unknown`.
pub struct TcpProbeConnectivity {
    status: Arc<StateCell<ConnectivityStatus>>,
    task: JoinHandle<()>,
}

impl TcpProbeConnectivity {
    /// Start probing `addr` every `interval`
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(addr: String, interval: Duration, timeout: Duration) -> Self {
        let status = Arc::new(StateCell::new(ConnectivityStatus::Unknown));
        let cell = Arc::clone(&status);

        info!(addr = %addr, interval_ms = interval.as_millis() as u64, "starting connectivity probe");
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let next = probe(&addr, timeout).await;
                if cell.set(next) {
                    debug!(addr = %addr, status = ?next, "connectivity changed");
                }
            }
        });

        Self { status, task }
    }
}

impl Connectivity for TcpProbeConnectivity {
    fn status(&self) -> StateStream<ConnectivityStatus> {
        self.status.subscribe()
    }
}

impl Drop for TcpProbeConnectivity {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn probe(addr: &str, timeout: Duration) -> ConnectivityStatus {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => ConnectivityStatus::Connected(ConnectionType::Unknown),
        Ok(Err(e)) => {
            debug!(addr, error = %e, "connectivity probe failed");
            ConnectivityStatus::NotConnected
        }
        Err(_) => ConnectivityStatus::NotConnected,
    }
}

/// Connectivity source described by configuration
///
/// Must be called inside a tokio runtime when probing.
pub fn connectivity_from_config(config: &ConnectivityConfig) -> Arc<dyn Connectivity> {
    match config.mode {
        ConnectivityMode::Always => Arc::new(AlwaysConnected::new()),
        ConnectivityMode::Probe => Arc::new(TcpProbeConnectivity::spawn(
            format!("{}:{}", config.probe_host, config.probe_port),
            Duration::from_millis(config.interval_ms),
            Duration::from_millis(config.timeout_ms),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_manual_connectivity_replays_latest() {
        let connectivity = ManualConnectivity::new();
        connectivity.set(ConnectivityStatus::NotConnected);
        connectivity.set(ConnectivityStatus::Connected(ConnectionType::Wifi));

        let mut status = connectivity.status();
        assert_eq!(
            status.next().await,
            Some(ConnectivityStatus::Connected(ConnectionType::Wifi))
        );
    }

    #[tokio::test]
    async fn test_probe_reports_reachable_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let probe = TcpProbeConnectivity::spawn(
            addr,
            Duration::from_millis(10),
            Duration::from_millis(500),
        );
        let mut status = probe.status();

        let mut seen = Vec::new();
        while let Ok(Some(next)) =
            tokio::time::timeout(Duration::from_secs(2), status.next()).await
        {
            seen.push(next);
            if next.is_connected() {
                break;
            }
        }
        assert_eq!(
            seen.last(),
            Some(&ConnectivityStatus::Connected(ConnectionType::Unknown))
        );
    }

    #[tokio::test]
    async fn test_always_connected_from_default_config() {
        let connectivity = connectivity_from_config(&ConnectivityConfig::default());
        let mut status = connectivity.status();
        assert!(status.next().await.unwrap().is_connected());
    }
}
