//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::error::Result;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is not set
pub fn default_directive(config: &LoggingConfig) -> String {
    format!(
        "task_estimator={},reqwest=warn,hyper=warn",
        config.level.to_lowercase()
    )
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides the configured level. Logs go to stderr so that
/// reports written to stdout stay machine-readable. Calling it again once a
/// global subscriber is installed is a no-op.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
    };

    if let Err(e) = installed {
        debug!("Tracing subscriber already installed: {}", e);
    }
    Ok(())
}
