use intercept_dns_domain::{Config, DomainError, UpstreamAddr};
use std::net::{Ipv4Addr, SocketAddr};

/// Values every query reads and that can change while the proxy runs.
///
/// Held behind an `ArcSwap`; writers build a new value and swap it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub upstream: Option<UpstreamAddr>,
    pub intercept_target: Ipv4Addr,
    /// Bind address exactly as passed to `start`.
    pub bind_address: Option<String>,
    pub local_addr: Option<SocketAddr>,
}

impl ProxySettings {
    pub fn new(upstream: Option<UpstreamAddr>, intercept_target: Ipv4Addr) -> Self {
        Self {
            upstream,
            intercept_target,
            bind_address: None,
            local_addr: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, DomainError> {
        let upstream = config
            .upstream
            .address
            .as_deref()
            .map(UpstreamAddr::parse)
            .transpose()?;
        Ok(Self::new(upstream, config.intercept.target_ip))
    }

    pub fn with_listener(
        mut self,
        bind_address: Option<String>,
        local_addr: Option<SocketAddr>,
    ) -> Self {
        self.bind_address = bind_address;
        self.local_addr = local_addr;
        self
    }

    /// Returns the address `upstream` collides with, if forwarding there
    /// would reach this proxy.
    pub fn self_reference(&self, upstream: &UpstreamAddr) -> Option<String> {
        if let Some(bind) = &self.bind_address {
            if upstream.points_at(bind) {
                return Some(bind.clone());
            }
        }

        let local = self.local_addr?.to_string();
        upstream.points_at(&local).then_some(local)
    }

    /// Same check after resolution, for hostnames that resolve onto the
    /// bound address.
    pub fn is_local_target(&self, target: SocketAddr) -> bool {
        match self.local_addr {
            Some(local) if local == target => true,
            Some(local) if local.ip().is_unspecified() => {
                local.port() == target.port() && target.ip().is_loopback()
            }
            _ => false,
        }
    }
}
