//! # Logging
//!
//! Tracing subscriber setup. `RUST_LOG` wins when set; otherwise the filter is
//! built from `LOG_LEVEL`.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// Anything other than `text` selects JSON
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("text") {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }
}

/// Filter directive for a `LOG_LEVEL` value
///
/// Unknown levels fall back to `info`.
#[must_use]
pub fn filter_directive(log_level: &str) -> String {
    let level = match log_level.trim().to_lowercase().as_str() {
        level @ ("error" | "warn" | "info" | "debug" | "trace") => level.to_string(),
        _ => "info".to_string(),
    };
    format!("namespace_replicator={level},kube=warn")
}

/// Install the global tracing subscriber
pub fn init_tracing(log_level: &str, log_format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    let result = match LogFormat::parse(log_format) {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .try_init(),
    };
    result.map_err(|e| anyhow!("Failed to initialize tracing subscriber: {e}"))
}
