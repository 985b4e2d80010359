//! Global tracing/logging subscriber management.

use std::sync::Once;

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::AppConfig;

/// Errors that can occur while initializing global telemetry.
#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static INIT: Once = Once::new();

/// Initialize tracing exactly once for the process. The `log::` bridge
/// routes SeaORM's sqlx logging through the tracing pipeline; `RUST_LOG`
/// wins over the configured level when set.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    let mut result = Ok(());

    INIT.call_once(|| {
        // Tests and embedding hosts may have installed a logger already;
        // that is not fatal, legacy log macros just stay on their pipeline.
        if LogTracer::init().is_err() {
            eprintln!("Warning: log tracer bridge already installed, skipping");
        }

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

        let format_layer = if config.log_format == "pretty" {
            fmt::layer().pretty().boxed()
        } else {
            fmt::layer().json().boxed()
        };

        if let Err(err) = tracing_subscriber::registry()
            .with(filter)
            .with(format_layer)
            .try_init()
        {
            result = Err(TelemetryInitError::Subscriber(err));
        }
    });

    result
}
