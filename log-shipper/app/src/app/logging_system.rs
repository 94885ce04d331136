use super::config::{LogFormat, LogLevel};
use std::sync::OnceLock;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crates whose own logging drowns out ours at debug level.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {details}")]
    InvalidFilter { filter: String, details: String },
    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Builds the filter string: the configured level first, then the quiet
/// targets, then anything the operator supplied through `RUST_LOG`.
pub fn build_filter_string(level: LogLevel, extra: Option<&str>) -> String {
    let default_level = tracing::Level::from(level).as_str().to_lowercase();
    let mut parts = Vec::with_capacity(QUIET_TARGETS.len() + 2);
    parts.push(default_level);
    for target in QUIET_TARGETS {
        parts.push(format!("{target}=warn"));
    }
    if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty()) {
        parts.push(extra.to_string());
    }
    parts.join(",")
}

fn install(level: LogLevel, format: LogFormat) -> Result<(), LoggingError> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter_string = build_filter_string(level, rust_log.as_deref());
    let env_filter =
        EnvFilter::try_new(&filter_string).map_err(|e| LoggingError::InvalidFilter {
            filter: filter_string.clone(),
            details: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .compact(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_target(true),
            )
            .try_init(),
    };
    result.map_err(|e| LoggingError::Install(e.to_string()))
}

/// Installs the global subscriber once. Later calls return the first outcome.
pub fn setup_logging(level: LogLevel, format: LogFormat) -> Result<(), LoggingError> {
    static INIT: OnceLock<Result<(), LoggingError>> = OnceLock::new();
    INIT.get_or_init(|| install(level, format)).clone()
}
