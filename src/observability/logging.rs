//! Structured logging configuration.

use crate::config::LoggingSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_FILTER_ENV: &str = "CARDSCHED_LOG";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Event filter.
    pub filter: EnvFilter,
    /// Output format.
    pub format: LogFormat,
    /// Append to this file instead of stderr.
    pub file: Option<PathBuf>,
    /// Why the requested filter was replaced by the default, if it was.
    pub filter_error: Option<String>,
}

impl LoggingConfig {
    /// Builds a logging configuration.
    ///
    /// The filter comes from [`LOG_FILTER_ENV`] if set, else the configured
    /// level, else `debug` when `verbose` and `info` otherwise. An invalid
    /// directive falls back to the default and is recorded in
    /// [`filter_error`](Self::filter_error).
    #[must_use]
    pub fn from_settings(settings: &LoggingSettings, verbose: bool) -> Self {
        let directive = std::env::var(LOG_FILTER_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| settings.level.clone())
            .unwrap_or_else(|| default_level(verbose).to_string());

        let (filter, filter_error) = match EnvFilter::try_new(&directive) {
            Ok(filter) => (filter, None),
            Err(e) => (
                EnvFilter::new(default_level(verbose)),
                Some(format!("invalid log filter '{directive}': {e}")),
            ),
        };

        Self {
            filter,
            format: settings.format,
            file: settings.file.clone(),
            filter_error,
        }
    }
}

const fn default_level(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}
