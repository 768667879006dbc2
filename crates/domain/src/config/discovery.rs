use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Substrings that flag a discovered hostname as a first-party service host.
    #[serde(default = "default_known_service_markers")]
    pub known_service_markers: Vec<String>,

    #[serde(default = "default_callback_queue_capacity")]
    pub callback_queue_capacity: usize,

    /// How long `record` waits for room in a full callback queue before dropping.
    #[serde(default = "default_callback_send_timeout_ms")]
    pub callback_send_timeout_ms: u64,
}

impl DiscoveryConfig {
    pub fn is_known_service(&self, hostname: &str) -> bool {
        self.known_service_markers
            .iter()
            .any(|marker| !marker.is_empty() && hostname.contains(marker.as_str()))
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            known_service_markers: default_known_service_markers(),
            callback_queue_capacity: default_callback_queue_capacity(),
            callback_send_timeout_ms: default_callback_send_timeout_ms(),
        }
    }
}

fn default_known_service_markers() -> Vec<String> {
    vec!["bose".to_string()]
}

fn default_callback_queue_capacity() -> usize {
    256
}

fn default_callback_send_timeout_ms() -> u64 {
    50
}
