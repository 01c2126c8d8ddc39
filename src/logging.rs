//! Logging setup for procmux.
//!
//! All output goes to stderr so that plugin results printed on stdout stay
//! machine-readable.
//!
//! # Environment Variables
//!
//! - `PROCMUX_LOG` - Log filter (overrides RUST_LOG)
//! - `PROCMUX_LOG_LEVEL` - Log level: error, warn, info, debug, trace
//! - `PROCMUX_LOG_FORMAT` - Output format: pretty, compact, json
//! - `RUST_LOG` - Standard Rust log filter (fallback)
//!
//! # Example
//!
//! ```no_run
//! use procmux::logging::{LogConfig, LogFormat, init};
//!
//! init(LogConfig::default().with_format(LogFormat::Compact).with_env_overrides());
//! ```

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line human-readable output
    #[default]
    Pretty,
    /// Single-line output
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "full" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Unknown log format: '{}'. Valid options: pretty, compact, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level (default: WARN)
    pub level: Level,
    pub format: LogFormat,
    /// Filter directive string; takes precedence over `level`
    pub filter: Option<String>,
    /// Show the target module (default: true)
    pub show_target: bool,
    /// Show thread names, which makes the worker thread stand out (default: false)
    pub show_thread_names: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Pretty,
            filter: None,
            show_target: true,
            show_thread_names: false,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_filter(mut self, filter: String) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_thread_names(mut self, enabled: bool) -> Self {
        self.show_thread_names = enabled;
        self
    }

    /// Apply environment variable overrides.
    ///
    /// A filter already set (e.g. from `-v`) wins over `PROCMUX_LOG`,
    /// `RUST_LOG` and `PROCMUX_LOG_LEVEL`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.filter.is_none() {
            self.filter = lookup("PROCMUX_LOG").or_else(|| lookup("RUST_LOG"));
        }

        if self.filter.is_none() {
            if let Some(level) = lookup("PROCMUX_LOG_LEVEL").and_then(|s| parse_level(&s)) {
                self.level = level;
            }
        }

        if let Some(format) = lookup("PROCMUX_LOG_FORMAT").and_then(|s| s.parse().ok()) {
            self.format = format;
        }

        self
    }

    fn build_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string().to_lowercase());
        match self.filter {
            Some(ref filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| {
                eprintln!("Warning: Invalid log filter '{}', using default", filter);
                fallback()
            }),
            None => fallback(),
        }
    }
}

/// Parse a log level string.
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Install the global tracing subscriber.
///
/// Subsequent calls are silently ignored.
pub fn init(config: LogConfig) {
    let filter = config.build_filter();

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(config.show_target)
                    .with_thread_names(config.show_thread_names)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_target(config.show_target)
                    .with_thread_names(config.show_thread_names)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(config.show_target)
                    .with_thread_names(config.show_thread_names)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    // Already initialized
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_procmux_log_beats_rust_log() {
        let config = LogConfig::default().with_overrides_from(lookup(&[
            ("PROCMUX_LOG", "procmux=trace"),
            ("RUST_LOG", "debug"),
        ]));
        assert_eq!(config.filter.as_deref(), Some("procmux=trace"));
    }

    #[test]
    fn test_cli_filter_wins_over_env() {
        let config = LogConfig::default()
            .with_filter("procmux=debug".to_string())
            .with_overrides_from(lookup(&[
                ("RUST_LOG", "trace"),
                ("PROCMUX_LOG_LEVEL", "error"),
            ]));
        assert_eq!(config.filter.as_deref(), Some("procmux=debug"));
        assert_eq!(config.level, Level::WARN);
    }

    #[test]
    fn test_level_and_format_from_env() {
        let config = LogConfig::default().with_overrides_from(lookup(&[
            ("PROCMUX_LOG_LEVEL", "info"),
            ("PROCMUX_LOG_FORMAT", "json"),
        ]));
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_filter_falls_back_to_level() {
        let config = LogConfig::default().with_filter("[[nope".to_string());
        // Must not panic.
        let _ = config.build_filter();
    }
}
