//! TCP Transport for DNS queries (RFC 1035 §4.2.2)
//!
//! Every message is preceded by a two-byte big-endian length. One connection
//! per query; upstream connections are not pooled.

use super::{DnsTransport, TransportResponse};
use async_trait::async_trait;
use intercept_dns_domain::DomainError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const MAX_TCP_MESSAGE_SIZE: usize = 65535;

pub struct TcpTransport {
    server_addr: SocketAddr,
}

impl TcpTransport {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self { server_addr }
    }

    async fn connect(&self) -> Result<TcpStream, DomainError> {
        let stream = TcpStream::connect(self.server_addr)
            .await
            .map_err(|e| DomainError::Transport {
                server: self.server_addr.to_string(),
                reason: format!("connect failed: {}", e),
            })?;

        stream.set_nodelay(true).map_err(|e| DomainError::Transport {
            server: self.server_addr.to_string(),
            reason: format!("failed to set TCP_NODELAY: {}", e),
        })?;

        Ok(stream)
    }
}

#[async_trait]
impl DnsTransport for TcpTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        let server = self.server_addr.to_string();

        let exchange = async {
            let mut stream = self.connect().await?;

            send_with_length_prefix(&mut stream, message_bytes).await?;
            debug!(
                server = %self.server_addr,
                message_len = message_bytes.len(),
                "TCP query sent"
            );

            read_with_length_prefix(&mut stream).await
        };

        let response_bytes = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| DomainError::QueryTimeout {
                server: server.clone(),
            })?
            .map_err(|e| match e {
                DomainError::IoError(reason) => DomainError::Transport { server, reason },
                other => other,
            })?;

        debug!(
            server = %self.server_addr,
            response_len = response_bytes.len(),
            "TCP response received"
        );

        Ok(TransportResponse {
            bytes: response_bytes,
            protocol_used: "TCP",
        })
    }

    fn protocol_name(&self) -> &'static str {
        "TCP"
    }
}

pub(crate) async fn send_with_length_prefix<S>(
    stream: &mut S,
    message_bytes: &[u8],
) -> Result<(), DomainError>
where
    S: AsyncWriteExt + Unpin,
{
    let length = u16::try_from(message_bytes.len()).map_err(|_| {
        DomainError::InvalidDnsMessage(format!(
            "message too large for TCP framing: {} bytes",
            message_bytes.len()
        ))
    })?;

    let mut framed = Vec::with_capacity(message_bytes.len() + 2);
    framed.extend_from_slice(&length.to_be_bytes());
    framed.extend_from_slice(message_bytes);

    stream
        .write_all(&framed)
        .await
        .map_err(|e| DomainError::IoError(format!("failed to write DNS message: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| DomainError::IoError(format!("failed to flush stream: {}", e)))?;

    Ok(())
}

pub(crate) async fn read_with_length_prefix<S>(stream: &mut S) -> Result<Vec<u8>, DomainError>
where
    S: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| DomainError::IoError(format!("failed to read message length: {}", e)))?;

    let message_len = u16::from_be_bytes(len_buf) as usize;

    if message_len > MAX_TCP_MESSAGE_SIZE {
        return Err(DomainError::InvalidDnsMessage(format!(
            "message too large: {} bytes (max {})",
            message_len, MAX_TCP_MESSAGE_SIZE
        )));
    }

    let mut message = vec![0u8; message_len];
    stream
        .read_exact(&mut message)
        .await
        .map_err(|e| DomainError::IoError(format!("failed to read message body: {}", e)))?;

    Ok(message)
}
