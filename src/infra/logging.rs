use tracing_subscriber::EnvFilter;

use crate::infra::{config::LogConfig, error::AppError};

const LOGGING_READY: &str = "LOGGING_READY";

/// Installs the global subscriber. `RUST_LOG` wins when set; otherwise only
/// this crate logs, at the configured level.
pub fn init(config: &LogConfig) -> Result<(), AppError> {
    let default_directive = format!("chatsync={}", config.level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_target(true)
        .try_init()
        .map_err(AppError::LoggingInit)?;
    tracing::debug!(code = LOGGING_READY, level = %config.level, "logging initialized");
    Ok(())
}
