//! UDP and TCP serve loops.
//!
//! Each loop runs until its token is cancelled or it hits an error it cannot
//! recover from. Every datagram and every TCP connection is handled on its
//! own task, so a slow upstream never stalls the loop.

use crate::dns::server::DnsServerHandler;
use crate::dns::transport::tcp::{read_with_length_prefix, send_with_length_prefix};
use intercept_dns_domain::{DnsProtocol, DomainError};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MAX_UDP_MESSAGE_SIZE: usize = 4096;
const TCP_BACKLOG: i32 = 1024;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Binds the UDP socket and the TCP listener on the same address.
///
/// With port 0 the TCP listener takes the port the UDP socket was given.
/// Fails without leaving either socket open.
pub fn bind_listeners(addr: SocketAddr) -> Result<(UdpSocket, TcpListener), DomainError> {
    let udp = create_udp_socket(addr).map_err(|e| bind_error("UDP", addr, e))?;
    let local_addr = udp.local_addr().map_err(|e| bind_error("UDP", addr, e))?;

    let tcp = create_tcp_listener(local_addr).map_err(|e| bind_error("TCP", local_addr, e))?;

    Ok((udp, tcp))
}

fn bind_error(protocol: &'static str, addr: SocketAddr, e: io::Error) -> DomainError {
    DomainError::Bind {
        protocol,
        addr: addr.to_string(),
        reason: e.to_string(),
    }
}

fn socket_domain(addr: SocketAddr) -> Domain {
    if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    }
}

// No SO_REUSEADDR on UDP: on Linux it lets a second socket share the port.
fn create_udp_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(socket_domain(addr), Type::DGRAM, Some(Protocol::UDP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

fn create_tcp_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(socket_domain(addr), Type::STREAM, Some(Protocol::TCP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(TCP_BACKLOG)?;
    socket.set_nonblocking(true)?;
    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// Errors a serve loop logs and survives.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

/// Out of descriptors or memory. Accepting again right away would spin, so
/// the TCP loop pauses first.
fn is_resource_exhaustion(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOMEM)
    )
}

pub async fn run_udp_listener(
    socket: UdpSocket,
    handler: Arc<DnsServerHandler>,
    token: CancellationToken,
) -> Result<(), DomainError> {
    let socket = Arc::new(socket);
    let mut recv_buf = vec![0u8; MAX_UDP_MESSAGE_SIZE];

    info!(
        bind_address = ?socket.local_addr().ok(),
        "UDP listener started"
    );

    loop {
        let (len, peer) = tokio::select! {
            _ = token.cancelled() => break,
            result = socket.recv_from(&mut recv_buf) => match result {
                Ok(received) => received,
                Err(e) if is_transient(&e) => {
                    debug!(error = %e, "Transient UDP receive error");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "UDP listener failed");
                    return Err(DomainError::ListenerFailed {
                        protocol: "UDP",
                        reason: e.to_string(),
                    });
                }
            },
        };

        let query = recv_buf[..len].to_vec();
        let handler = Arc::clone(&handler);
        let socket = Arc::clone(&socket);
        tokio::spawn(async move {
            if let Some(response) = handler.handle_raw(&query, peer, DnsProtocol::Udp).await {
                if let Err(e) = socket.send_to(&response, peer).await {
                    warn!(client = %peer, error = %e, "Failed to write UDP response");
                }
            }
        });
    }

    info!("UDP listener stopped");
    Ok(())
}

pub async fn run_tcp_listener(
    listener: TcpListener,
    handler: Arc<DnsServerHandler>,
    idle_timeout: Duration,
    token: CancellationToken,
) -> Result<(), DomainError> {
    info!(
        bind_address = ?listener.local_addr().ok(),
        "TCP listener started"
    );

    loop {
        let (stream, peer) = tokio::select! {
            _ = token.cancelled() => break,
            result = listener.accept() => match result {
                Ok(accepted) => accepted,
                Err(e) if is_transient(&e) => {
                    debug!(error = %e, "Transient TCP accept error");
                    continue;
                }
                Err(e) if is_resource_exhaustion(&e) => {
                    warn!(error = %e, "TCP accept out of resources, backing off");
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(ACCEPT_BACKOFF) => continue,
                    }
                }
                Err(e) => {
                    error!(error = %e, "TCP listener failed");
                    return Err(DomainError::ListenerFailed {
                        protocol: "TCP",
                        reason: e.to_string(),
                    });
                }
            },
        };

        let handler = Arc::clone(&handler);
        let token = token.clone();
        tokio::spawn(async move {
            handle_tcp_connection(stream, peer, handler, idle_timeout, token).await;
        });
    }

    info!("TCP listener stopped");
    Ok(())
}

/// Serves length-prefixed queries on one connection until the client closes
/// it, it sits idle past `idle_timeout`, or the listener shuts down between
/// queries.
async fn handle_tcp_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<DnsServerHandler>,
    idle_timeout: Duration,
    token: CancellationToken,
) {
    loop {
        let query = tokio::select! {
            _ = token.cancelled() => break,
            result = tokio::time::timeout(idle_timeout, read_with_length_prefix(&mut stream)) => {
                match result {
                    Ok(Ok(query)) => query,
                    Ok(Err(e)) => {
                        debug!(client = %peer, error = %e, "TCP connection closed");
                        break;
                    }
                    Err(_) => {
                        debug!(client = %peer, "TCP connection idle, closing");
                        break;
                    }
                }
            }
        };

        let Some(response) = handler.handle_raw(&query, peer, DnsProtocol::Tcp).await else {
            continue;
        };

        if let Err(e) = send_with_length_prefix(&mut stream, &response).await {
            warn!(client = %peer, error = %e, "Failed to write TCP response");
            break;
        }
    }
}
