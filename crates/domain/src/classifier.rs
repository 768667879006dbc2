use crate::config::{InterceptConfig, MatchMode};

/// What the proxy does with a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryDecision {
    /// Answer locally, pointing the name at the intercept target.
    Intercept,
    /// Relay to the upstream resolver.
    Forward,
}

impl QueryDecision {
    pub fn is_intercept(&self) -> bool {
        matches!(self, QueryDecision::Intercept)
    }
}

/// Decides intercept vs. forward from the query name alone.
#[derive(Debug, Clone)]
pub struct QueryClassifier {
    domains: Vec<String>,
    sentinel: String,
    mode: MatchMode,
}

impl QueryClassifier {
    pub fn new(
        domains: impl IntoIterator<Item = impl Into<String>>,
        sentinel: impl Into<String>,
        mode: MatchMode,
    ) -> Self {
        let normalize = |s: String| match mode {
            MatchMode::Substring => s,
            MatchMode::Suffix => s.trim_end_matches('.').to_ascii_lowercase(),
        };

        Self {
            domains: domains
                .into_iter()
                .map(Into::<String>::into)
                .filter(|d| !d.is_empty())
                .map(&normalize)
                .collect(),
            sentinel: normalize(sentinel.into()),
            mode,
        }
    }

    pub fn from_config(config: &InterceptConfig) -> Self {
        Self::new(
            config.domains.iter().cloned(),
            config.sentinel.clone(),
            config.match_mode,
        )
    }

    /// `name` is the query name without its trailing root dot.
    pub fn classify(&self, name: &str) -> QueryDecision {
        let intercept = match self.mode {
            MatchMode::Substring => {
                (!self.sentinel.is_empty() && name == self.sentinel)
                    || self.domains.iter().any(|d| name.contains(d.as_str()))
            }
            MatchMode::Suffix => {
                let name = name.to_ascii_lowercase();
                (!self.sentinel.is_empty() && name == self.sentinel)
                    || self.domains.iter().any(|d| is_same_or_subdomain(&name, d))
            }
        };

        if intercept {
            QueryDecision::Intercept
        } else {
            QueryDecision::Forward
        }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }
}

fn is_same_or_subdomain(name: &str, domain: &str) -> bool {
    match name.strip_suffix(domain) {
        Some("") => true,
        Some(prefix) => prefix.ends_with('.'),
        None => false,
    }
}
