//! Tracing subscriber setup for binaries embedding this crate
//!
//! The library itself only emits `tracing` events; controllers call
//! [`init_tracing`] once at startup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::Error;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,state_transfer=debug,kube=info,tower=warn,hyper=warn";

/// Output format for log lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines with span context
    #[default]
    Json,
    /// Human readable
    Pretty,
}

/// Configuration for tracing initialization
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Log line format
    pub format: LogFormat,
    /// Filter directives; `None` reads `RUST_LOG`, falling back to [`DEFAULT_LOG_FILTER`]
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            filter: None,
        }
    }
}

fn env_filter(config: &TracingConfig) -> Result<EnvFilter, Error> {
    match &config.filter {
        Some(directives) => EnvFilter::try_new(directives).map_err(|e| {
            Error::internal_with_context("telemetry", format!("invalid log filter: {}", e))
        }),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}

/// Install the global tracing subscriber
///
/// Fails if a subscriber is already installed or the filter is invalid.
pub fn init_tracing(config: TracingConfig) -> Result<(), Error> {
    let filter = env_filter(&config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    result.map_err(|e| {
        Error::internal_with_context("telemetry", format!("failed to install subscriber: {}", e))
    })
}
