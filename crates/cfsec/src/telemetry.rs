//! Tracing subscriber setup.

use cfsec_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

use crate::error::{CfSecError, Result};

/// Builds the filter: `RUST_LOG` wins, otherwise the configured directives.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| CfSecError::Telemetry(format!("invalid filter {:?}: {e}", config.filter))),
    }
}

/// Installs a global fmt subscriber.
///
/// Idempotent: when a global subscriber is already set (by an earlier call or
/// by the host application) it is left in place. Fails only if the filter
/// does not parse.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
    {
        tracing::debug!(error = %err, "global subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_filter() {
        let config = LoggingConfig {
            filter: "cfsec_kernel=loudest".to_string(),
        };
        // RUST_LOG may be set in CI, in which case the configured filter is not consulted.
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(matches!(env_filter(&config), Err(CfSecError::Telemetry(_))));
        }
    }

    #[test]
    fn accepts_default_filter() {
        assert!(env_filter(&LoggingConfig::default()).is_ok());
    }

    #[test]
    fn init_twice_is_ok() {
        let config = LoggingConfig::default();
        assert!(init(&config).is_ok());
        assert!(init(&config).is_ok());
    }
}
