//! UdpTransport - fire-and-forget datagrams to a collection endpoint

use std::collections::HashMap;
use std::net::SocketAddr;

use contracts::{ContractError, Transport};
use tokio::net::UdpSocket;
use tracing::{debug, instrument};

/// Configuration for UdpTransport
#[derive(Debug, Clone)]
pub struct UdpTransportConfig {
    /// Target address
    pub addr: SocketAddr,
    /// Max packet size (UDP typically 65507 for IPv4)
    pub max_packet_size: usize,
}

impl UdpTransportConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr_str, e))?;

        let max_packet_size = params
            .get("max_packet_size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(65000);

        Ok(Self {
            addr,
            max_packet_size,
        })
    }
}

/// Transport that sends each batch as one UDP datagram
///
/// A successful send only means the datagram left this host.
pub struct UdpTransport {
    endpoint: String,
    config: UdpTransportConfig,
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind an ephemeral port and connect it to `config.addr`
    #[instrument(name = "udp_transport_connect", skip(config), fields(target = %config.addr))]
    pub async fn connect(config: UdpTransportConfig) -> std::io::Result<Self> {
        let bind_addr = if config.addr.is_ipv6() {
            "[::]:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(&config.addr).await?;

        debug!(target = %config.addr, "UdpTransport connected");

        Ok(Self {
            endpoint: format!("udp://{}", config.addr),
            config,
            socket,
        })
    }

    /// Create from params (for factory)
    pub async fn from_params(params: &HashMap<String, String>) -> Result<Self, ContractError> {
        let config =
            UdpTransportConfig::from_params(params).map_err(|e| ContractError::transport("udp", e))?;
        let endpoint = config.addr.to_string();

        Self::connect(config)
            .await
            .map_err(|e| ContractError::transport(endpoint, e.to_string()))
    }
}

impl Transport for UdpTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, body: &[u8]) -> Result<(), ContractError> {
        if body.len() > self.config.max_packet_size {
            return Err(ContractError::transport(
                &self.endpoint,
                format!(
                    "packet of {} bytes exceeds limit of {}",
                    body.len(),
                    self.config.max_packet_size
                ),
            ));
        }

        let sent = self
            .socket
            .send(body)
            .await
            .map_err(|e| ContractError::transport(&self.endpoint, e.to_string()))?;
        debug!(endpoint = %self.endpoint, bytes = sent, "Sent");
        Ok(())
    }
}
