//! Structured logging setup.
//!
//! Call [`init_logging`] once at startup. `RUST_LOG` overrides the configured
//! level, e.g. `RUST_LOG=freeze_guard=debug`.
//!
//! Field names used across the crate:
//! - `action`: instrumented action name
//! - `thread`: wire thread label (`EDT`, `BGT`, `MAIN`, `WORKER`)
//! - `outcome`: terminal delivery outcome (`delivered`, `rejected`,
//!   `transport`, `timeout`, `encode`)
//! - `delay_ms`, `count`, `longest_ms`: stall measurements

use std::sync::OnceLock;

use thiserror::Error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub use crate::config::{LogConfig, LogFormat};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,

    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Installs the global subscriber.
///
/// Subsequent calls return [`LogError::AlreadyInitialized`].
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    if LOGGING_INITIALIZED.get().is_some() {
        return Err(LogError::AlreadyInitialized);
    }

    let filter = build_filter(config)?;

    match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(false))
            .try_init()?,
    }

    let _ = LOGGING_INITIALIZED.set(());
    Ok(())
}

/// `RUST_LOG` when set, otherwise the configured level.
fn build_filter(config: &LogConfig) -> Result<EnvFilter, LogError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|_| LogError::InvalidLevel(config.level.clone())),
    }
}
