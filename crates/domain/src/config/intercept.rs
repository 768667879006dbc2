use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// How intercept domains are matched against query names.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Case-sensitive, unanchored substring containment.
    #[default]
    Substring,

    /// Case-insensitive match of the domain itself or any name below it.
    Suffix,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Substring => "substring",
            Self::Suffix => "suffix",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterceptConfig {
    /// Address handed out in A answers for intercepted names.
    #[serde(default = "default_target_ip")]
    pub target_ip: Ipv4Addr,

    #[serde(default = "default_domains")]
    pub domains: Vec<String>,

    #[serde(default = "default_sentinel")]
    pub sentinel: String,

    #[serde(default = "default_ttl")]
    pub ttl_secs: u32,

    #[serde(default)]
    pub match_mode: MatchMode,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            target_ip: default_target_ip(),
            domains: default_domains(),
            sentinel: default_sentinel(),
            ttl_secs: default_ttl(),
            match_mode: MatchMode::default(),
        }
    }
}

fn default_target_ip() -> Ipv4Addr {
    Ipv4Addr::LOCALHOST
}

fn default_domains() -> Vec<String> {
    vec!["bose.com".to_string(), "bose.io".to_string()]
}

fn default_sentinel() -> String {
    "intercept.test".to_string()
}

fn default_ttl() -> u32 {
    60
}
