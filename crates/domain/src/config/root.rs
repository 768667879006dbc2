use serde::{Deserialize, Serialize};

use super::discovery::DiscoveryConfig;
use super::errors::ConfigError;
use super::intercept::InterceptConfig;
use super::logging::LoggingConfig;
use super::server::ServerConfig;
use super::upstream::UpstreamConfig;
use crate::upstream::UpstreamAddr;

const LOCAL_CONFIG_PATH: &str = "intercept-dns.toml";
const SYSTEM_CONFIG_PATH: &str = "/etc/intercept-dns/config.toml";

/// Main configuration structure for the intercepting proxy
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Listener configuration (bind address, port)
    #[serde(default)]
    pub server: ServerConfig,

    /// Where non-intercepted queries are relayed
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Which names are redirected, and where to
    #[serde(default)]
    pub intercept: InterceptConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file or use defaults
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. intercept-dns.toml in current directory
    /// 3. /etc/intercept-dns/config.toml
    /// 4. Default configuration
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            Self::from_file(path)
        } else if std::path::Path::new(LOCAL_CONFIG_PATH).exists() {
            Self::from_file(LOCAL_CONFIG_PATH)
        } else if std::path::Path::new(SYSTEM_CONFIG_PATH).exists() {
            Self::from_file(SYSTEM_CONFIG_PATH)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Bind address cannot be empty".to_string(),
            ));
        }

        if let Some(address) = &self.upstream.address {
            UpstreamAddr::parse(address)
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }

        if self.upstream.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Upstream timeout must be greater than 0".to_string(),
            ));
        }

        if self.intercept.domains.iter().any(|d| d.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "Intercept domains cannot contain empty entries".to_string(),
            ));
        }

        if self.discovery.callback_queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "Discovery callback queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.logging.throttle_max_keys == 0 {
            return Err(ConfigError::Validation(
                "Throttle key limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, toml_string)
            .map_err(|e| ConfigError::FileWrite(path.to_string(), e.to_string()))?;
        Ok(())
    }
}
