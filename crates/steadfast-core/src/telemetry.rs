//! Process-wide log sink
//!
//! Lifecycle events from [`TracingObserver`](crate::retry::TracingObserver)
//! go nowhere until a subscriber is installed. [`init`] installs one; only
//! the first call in a process has any effect.

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::{fmt as fmt_layer, prelude::*, EnvFilter};

use crate::error::Error;

/// Output encoding for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::invalid_config(format!(
                "Unknown log format '{}', expected 'text' or 'json'",
                other
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Log sink settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetryConfig {
    /// 0 = info, 1 = debug, 2+ = trace
    pub verbosity: u8,
    /// Only errors; wins over `verbosity`
    pub quiet: bool,
    /// Encoding of each log line
    pub format: LogFormat,
}

impl TelemetryConfig {
    /// Filter directive selected by the flags
    pub fn directive(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// `RUST_LOG` applies only when no flag asked for a specific level
    fn filter(&self) -> EnvFilter {
        if !self.quiet && self.verbosity == 0 {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return filter;
            }
        }
        EnvFilter::new(self.directive())
    }
}

/// Install the global subscriber
///
/// Returns `true` if this call installed it, `false` if a subscriber was
/// already in place (the existing one is left untouched).
pub fn init(config: TelemetryConfig) -> bool {
    let registry = tracing_subscriber::registry().with(config.filter());

    let installed = match config.format {
        LogFormat::Text => registry
            .with(
                fmt_layer::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt_layer::layer()
                    .json()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_from_flags() {
        let mut config = TelemetryConfig::default();
        assert_eq!(config.directive(), "info");

        config.verbosity = 1;
        assert_eq!(config.directive(), "debug");

        config.verbosity = 3;
        assert_eq!(config.directive(), "trace");

        config.quiet = true;
        assert_eq!(config.directive(), "error");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_init_is_idempotent() {
        let _ = init(TelemetryConfig::default());
        assert!(!init(TelemetryConfig {
            format: LogFormat::Json,
            ..Default::default()
        }));
    }
}
