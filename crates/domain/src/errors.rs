use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid upstream address: {0}")]
    InvalidUpstream(String),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid DNS message: {0}")]
    InvalidDnsMessage(String),

    #[error("No upstream resolver configured")]
    NoUpstream,

    #[error("Upstream {upstream} points back at this proxy ({bind})")]
    LoopDetected { upstream: String, bind: String },

    #[error("Query timeout waiting for {server}")]
    QueryTimeout { server: String },

    #[error("Transport error talking to {server}: {reason}")]
    Transport { server: String, reason: String },

    #[error("Failed to bind {protocol} listener on {addr}: {reason}")]
    Bind {
        protocol: &'static str,
        addr: String,
        reason: String,
    },

    #[error("DNS proxy is already running on {0}")]
    AlreadyRunning(String),

    #[error("{protocol} listener stopped: {reason}")]
    ListenerFailed {
        protocol: &'static str,
        reason: String,
    },

    #[error("I/O error: {0}")]
    IoError(String),
}

impl DomainError {
    /// True for failures that come from talking to the upstream resolver.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            DomainError::QueryTimeout { .. } | DomainError::Transport { .. }
        )
    }
}
