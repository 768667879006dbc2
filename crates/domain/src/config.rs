pub mod discovery;
pub mod errors;
pub mod intercept;
pub mod logging;
pub mod root;
pub mod server;
pub mod upstream;

pub use discovery::DiscoveryConfig;
pub use errors::ConfigError;
pub use intercept::{InterceptConfig, MatchMode};
pub use logging::LoggingConfig;
pub use root::Config;
pub use server::ServerConfig;
pub use upstream::UpstreamConfig;
