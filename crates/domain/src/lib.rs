//! Intercept DNS Domain Layer
pub mod classifier;
pub mod config;
pub mod discovered_host;
pub mod dns_protocol;
pub mod errors;
pub mod upstream;

pub use classifier::{QueryClassifier, QueryDecision};
pub use config::{
    Config, ConfigError, DiscoveryConfig, InterceptConfig, LoggingConfig, MatchMode,
    ServerConfig, UpstreamConfig,
};
pub use discovered_host::{normalize_hostname, DiscoveredHost};
pub use dns_protocol::DnsProtocol;
pub use errors::DomainError;
pub use upstream::{parse_listen_addr, UpstreamAddr, DEFAULT_DNS_PORT};
