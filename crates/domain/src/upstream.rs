use crate::errors::DomainError;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_DNS_PORT: u16 = 53;

const LOOPBACK_HOSTS: [&str; 4] = ["127.0.0.1", "localhost", "[::1]", "0.0.0.0"];

/// Upstream resolver address with the port made explicit.
///
/// The host is kept as written so loop detection can compare it textually
/// against the proxy's own bind address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamAddr {
    host: Arc<str>,
    port: u16,
}

impl UpstreamAddr {
    /// Parses `host`, `host:port`, `ip`, `[ipv6]` or `[ipv6]:port`.
    /// A missing port defaults to 53.
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(DomainError::InvalidUpstream(
                "upstream address is empty".to_string(),
            ));
        }

        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Self::from_ip(addr.ip(), addr.port()));
        }
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::from_ip(ip, DEFAULT_DNS_PORT));
        }
        if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            let ip = inner
                .parse::<IpAddr>()
                .map_err(|e| DomainError::InvalidUpstream(format!("'{}': {}", input, e)))?;
            return Ok(Self::from_ip(ip, DEFAULT_DNS_PORT));
        }

        let (host, port) = match s.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str.parse::<u16>().map_err(|e| {
                    DomainError::InvalidUpstream(format!("invalid port in '{}': {}", input, e))
                })?;
                (host, port)
            }
            None => (s, DEFAULT_DNS_PORT),
        };

        if !is_valid_hostname(host) {
            return Err(DomainError::InvalidUpstream(format!(
                "invalid host in '{}'",
                input
            )));
        }

        Ok(Self {
            host: host.into(),
            port,
        })
    }

    fn from_ip(ip: IpAddr, port: u16) -> Self {
        Self {
            host: ip.to_string().into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The socket address when the host is an IP literal.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.host
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }

    pub fn needs_resolution(&self) -> bool {
        self.socket_addr().is_none()
    }

    /// Whether forwarding here would send the query straight back to a proxy
    /// bound on `bind`.
    ///
    /// Matches the exact text, and the loopback spellings of a wildcard bind
    /// (`:53` or `0.0.0.0:53` against `127.0.0.1:53`, `localhost:53`, ...).
    pub fn points_at(&self, bind: &str) -> bool {
        let target = self.to_string();
        let bind = bind.trim();
        if target == bind {
            return true;
        }

        let wildcard_port = bind
            .strip_prefix(':')
            .or_else(|| bind.strip_prefix("0.0.0.0:"))
            .or_else(|| bind.strip_prefix("[::]:"));

        match wildcard_port {
            Some(port) => LOOPBACK_HOSTS
                .iter()
                .any(|host| target == format!("{}:{}", host, port)),
            None => false,
        }
    }
}

impl fmt::Display for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for UpstreamAddr {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_valid_hostname(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= 253
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

/// Parses a listen address, accepting the `:PORT` shorthand for all IPv4 interfaces.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, DomainError> {
    let trimmed = addr.trim();
    let expanded;
    let candidate = if trimmed.starts_with(':') {
        expanded = format!("0.0.0.0{}", trimmed);
        expanded.as_str()
    } else {
        trimmed
    };

    candidate
        .parse::<SocketAddr>()
        .map_err(|e| DomainError::InvalidBindAddress(format!("'{}': {}", addr, e)))
}
