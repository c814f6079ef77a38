//! Network transport and box discovery
//!
//! WiFi-bridged boxes answer a UDP broadcast with their IPv4 address and
//! then accept the regular serial protocol over TCP.

use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream, UdpSocket};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::error::LinkError;
use crate::transport::{read_exact_within, Transport};

/// Discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Identification string broadcast to find boxes
    pub message: String,
    /// UDP port boxes listen on for the broadcast
    pub discovery_port: u16,
    /// TCP port boxes accept protocol connections on
    pub tcp_port: u16,
    /// How long to wait for an answer
    pub timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            message: "MK312-DISCOVER".to_string(),
            discovery_port: 8842,
            tcp_port: 8843,
            timeout: Duration::from_secs(2),
        }
    }
}

/// Broadcast a discovery request and return the first box address that answers
pub fn discover(config: &DiscoveryConfig) -> Result<Ipv4Addr, LinkError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.set_broadcast(true)?;
    socket.send_to(
        config.message.as_bytes(),
        (Ipv4Addr::BROADCAST, config.discovery_port),
    )?;
    debug!(
        "Sent discovery broadcast to port {}",
        config.discovery_port
    );

    let deadline = Instant::now() + config.timeout;
    let mut buf = [0u8; 64];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(LinkError::Discovery("no box answered".to_string()));
        }
        socket.set_read_timeout(Some(remaining))?;

        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                trace!("Discovery reply from {}: {:02X?}", from, &buf[..n]);
                if let Some(addr) = parse_discovery_reply(&buf[..n]) {
                    info!("Discovered box at {}", addr);
                    return Ok(addr);
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(LinkError::Discovery("no box answered".to_string()));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Boxes answer with their four-byte IPv4 address
fn parse_discovery_reply(reply: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = reply.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

/// Transport over a TCP connection to a WiFi-bridged box
pub struct TcpTransport {
    address: SocketAddr,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Create a closed transport for `address`
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            connect_timeout: Duration::from_secs(3),
            stream: None,
        }
    }

    /// Discover a box and create a transport for its protocol port
    pub fn discover(config: &DiscoveryConfig) -> Result<Self, LinkError> {
        let ip = discover(config)?;
        Ok(Self::new(SocketAddr::V4(SocketAddrV4::new(ip, config.tcp_port))))
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream, LinkError> {
        self.stream.as_mut().ok_or(LinkError::NotConnected)
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> Result<(), LinkError> {
        let stream = TcpStream::connect_timeout(&self.address, self.connect_timeout).map_err(
            |e| LinkError::ConnectFailed {
                connector: self.address.to_string(),
                reason: e.to_string(),
            },
        )?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", self.address);
        self.stream = Some(stream);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) -> Result<(), LinkError> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            debug!("Closed connection to {}", self.address);
        }
        Ok(())
    }

    fn read_bytes(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<(), LinkError> {
        let stream = self.stream_mut()?;
        read_exact_within(stream, buffer, timeout, |stream, remaining| {
            stream.set_read_timeout(Some(remaining))?;
            Ok(())
        })
    }

    fn write_bytes(&mut self, buffer: &[u8]) -> Result<(), LinkError> {
        let stream = self.stream_mut()?;
        stream.write_all(buffer)?;
        stream.flush()?;
        Ok(())
    }

    fn connector_name(&self) -> String {
        self.address.to_string()
    }
}
