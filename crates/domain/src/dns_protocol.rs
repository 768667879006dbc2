use std::fmt;

/// Transport a query arrived on. Forwarding reuses the same transport upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsProtocol {
    Udp,
    Tcp,
}

impl DnsProtocol {
    pub fn protocol_name(&self) -> &'static str {
        match self {
            DnsProtocol::Udp => "UDP",
            DnsProtocol::Tcp => "TCP",
        }
    }
}

impl fmt::Display for DnsProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol_name())
    }
}
