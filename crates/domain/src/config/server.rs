use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_dns_port")]
    pub dns_port: u16,

    /// Idle read timeout for DNS-over-TCP client connections.
    #[serde(default = "default_tcp_idle_timeout")]
    pub tcp_idle_timeout_secs: u64,
}

impl ServerConfig {
    /// `bind_address:dns_port`, bracketing IPv6 literals.
    pub fn listen_addr(&self) -> String {
        if self.bind_address.contains(':') && !self.bind_address.starts_with('[') {
            format!("[{}]:{}", self.bind_address, self.dns_port)
        } else {
            format!("{}:{}", self.bind_address, self.dns_port)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            dns_port: default_dns_port(),
            tcp_idle_timeout_secs: default_tcp_idle_timeout(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_dns_port() -> u16 {
    53
}

fn default_tcp_idle_timeout() -> u64 {
    10
}
