use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// A hostname the proxy has seen queried at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredHost {
    /// Query name with the trailing root dot stripped.
    pub hostname: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub query_count: u64,
    /// Heuristic: the name carries one of the vendor markers.
    pub is_known_service: bool,
    /// Classification of the most recent query.
    pub is_intercepted: bool,
    /// Client that sent the most recent query, when known.
    pub remote_addr: Option<SocketAddr>,
}

impl DiscoveredHost {
    pub fn new(
        hostname: impl Into<String>,
        is_known_service: bool,
        is_intercepted: bool,
        remote_addr: Option<SocketAddr>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            first_seen: now,
            last_seen: now,
            query_count: 1,
            is_known_service,
            is_intercepted,
            remote_addr,
        }
    }

    /// Applies a repeat observation. `last_seen` never moves backwards.
    pub fn observe(
        &mut self,
        is_intercepted: bool,
        remote_addr: Option<SocketAddr>,
        now: DateTime<Utc>,
    ) {
        self.query_count += 1;
        if now > self.last_seen {
            self.last_seen = now;
        }
        self.is_intercepted = is_intercepted;
        if remote_addr.is_some() {
            self.remote_addr = remote_addr;
        }
    }
}

/// Strips the trailing root dot from a query name.
pub fn normalize_hostname(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}
