use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    /// Window during which an identical throttled message is suppressed.
    #[serde(default = "default_throttle_window")]
    pub throttle_window_secs: u64,

    #[serde(default = "default_throttle_max_keys")]
    pub throttle_max_keys: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            throttle_window_secs: default_throttle_window(),
            throttle_max_keys: default_throttle_max_keys(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_throttle_window() -> u64 {
    10
}

fn default_throttle_max_keys() -> usize {
    1024
}
