pub mod tcp;
pub mod udp;

use async_trait::async_trait;
use intercept_dns_domain::{DnsProtocol, DomainError};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug)]
pub struct TransportResponse {
    pub bytes: Vec<u8>,

    pub protocol_used: &'static str,
}

#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError>;

    fn protocol_name(&self) -> &'static str;
}

pub enum Transport {
    Udp(udp::UdpTransport),
    Tcp(tcp::TcpTransport),
}

impl Transport {
    pub async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        match self {
            Self::Udp(t) => DnsTransport::send(t, message_bytes, timeout).await,
            Self::Tcp(t) => DnsTransport::send(t, message_bytes, timeout).await,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            Self::Udp(_) => "UDP",
            Self::Tcp(_) => "TCP",
        }
    }
}

/// Picks the upstream transport matching the one the client used.
pub fn create_transport(protocol: DnsProtocol, server: SocketAddr) -> Transport {
    match protocol {
        DnsProtocol::Udp => Transport::Udp(udp::UdpTransport::new(server)),
        DnsProtocol::Tcp => Transport::Tcp(tcp::TcpTransport::new(server)),
    }
}

/// One request/response round trip with an upstream resolver.
///
/// The forwarder only talks to upstreams through this seam.
#[async_trait]
pub trait DnsExchange: Send + Sync {
    async fn exchange(
        &self,
        message_bytes: &[u8],
        server: SocketAddr,
        protocol: DnsProtocol,
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError>;
}

/// Real network exchange: a fresh UDP socket or TCP connection per query.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkExchange;

#[async_trait]
impl DnsExchange for NetworkExchange {
    async fn exchange(
        &self,
        message_bytes: &[u8],
        server: SocketAddr,
        protocol: DnsProtocol,
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        create_transport(protocol, server)
            .send(message_bytes, timeout)
            .await
    }
}
