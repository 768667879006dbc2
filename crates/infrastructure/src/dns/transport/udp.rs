//! UDP Transport for DNS queries (RFC 1035 §4.2.1)
//!
//! Messages are sent as-is (no framing). The response is relayed verbatim,
//! including a set TC bit; the client retries over TCP on its own.

use super::{DnsTransport, TransportResponse};
use async_trait::async_trait;
use intercept_dns_domain::DomainError;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Largest possible UDP payload, so an EDNS(0) reply is never cut short.
const MAX_UDP_RESPONSE_SIZE: usize = 65535;

/// DNS over UDP transport
pub struct UdpTransport {
    server_addr: SocketAddr,
}

impl UdpTransport {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self { server_addr }
    }

    fn transport_error(&self, reason: String) -> DomainError {
        DomainError::Transport {
            server: self.server_addr.to_string(),
            reason,
        }
    }

    fn timeout_error(&self) -> DomainError {
        DomainError::QueryTimeout {
            server: self.server_addr.to_string(),
        }
    }
}

#[async_trait]
impl DnsTransport for UdpTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        let bind_addr = if self.server_addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| self.transport_error(format!("failed to bind UDP socket: {}", e)))?;

        let exchange = async {
            let bytes_sent = socket
                .send_to(message_bytes, self.server_addr)
                .await
                .map_err(|e| self.transport_error(format!("send failed: {}", e)))?;

            debug!(
                server = %self.server_addr,
                bytes_sent = bytes_sent,
                "UDP query sent"
            );

            let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
            loop {
                let (bytes_received, from_addr) = socket
                    .recv_from(&mut recv_buf)
                    .await
                    .map_err(|e| self.transport_error(format!("receive failed: {}", e)))?;

                if from_addr.ip() != self.server_addr.ip()
                    || from_addr.port() != self.server_addr.port()
                {
                    warn!(
                        expected = %self.server_addr,
                        received_from = %from_addr,
                        "UDP response from unexpected source, ignoring"
                    );
                    continue;
                }

                recv_buf.truncate(bytes_received);
                return Ok::<_, DomainError>(recv_buf);
            }
        };

        // One budget covers the whole round trip.
        let recv_buf = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| self.timeout_error())??;

        debug!(
            server = %self.server_addr,
            bytes_received = recv_buf.len(),
            "UDP response received"
        );

        Ok(TransportResponse {
            bytes: recv_buf,
            protocol_used: "UDP",
        })
    }

    fn protocol_name(&self) -> &'static str {
        "UDP"
    }
}
