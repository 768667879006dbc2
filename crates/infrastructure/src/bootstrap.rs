use intercept_dns_domain::{DomainError, LoggingConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `config.level` when set. Fails if a subscriber is
/// already installed or the level does not parse.
pub fn init_logging(config: &LoggingConfig) -> Result<(), DomainError> {
    let filter = build_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), &config.level)?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|e| DomainError::IoError(format!("failed to install logger: {}", e)))?;

    info!(
        level = %config.level,
        json = config.json,
        throttle_window_secs = config.throttle_window_secs,
        "Logging initialized"
    );
    Ok(())
}

fn build_filter(env_directives: Option<String>, level: &str) -> Result<EnvFilter, DomainError> {
    match env_directives {
        Some(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(level),
    }
    .map_err(|e| DomainError::IoError(format!("invalid log filter: {}", e)))
}
