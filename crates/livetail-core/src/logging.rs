//! Logging bootstrap for live tail hosts.
//!
//! Level and format strings come from [`LoggingSettings`]; `RUST_LOG`, when
//! set, takes precedence over the configured level.

use std::fmt;

use tracing_subscriber::EnvFilter;

use crate::settings::LoggingSettings;

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a log level string (case-insensitive, defaults to Info).
    pub fn parse(s: &str) -> Self {
        Self::try_parse(s).unwrap_or(Self::Info)
    }

    /// Strict form of [`Self::parse`]: `None` for unknown levels.
    pub fn try_parse(s: &str) -> Option<Self> {
        match s.to_lowercase().trim() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Directive understood by [`EnvFilter`].
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_directive().to_uppercase())
    }
}

/// Output format for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Console,
    Json,
}

impl LogFormat {
    /// Parse a format string (defaults to Console).
    pub fn parse(s: &str) -> Self {
        Self::try_parse(s).unwrap_or(Self::Console)
    }

    pub fn try_parse(s: &str) -> Option<Self> {
        match s.to_lowercase().trim() {
            "console" => Some(Self::Console),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Console,
        }
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: LogLevel::parse(&settings.level),
            format: LogFormat::parse(&settings.format),
        }
    }
}

/// Builds the event filter: `RUST_LOG` if present and valid, else the
/// configured level.
pub fn build_filter(cfg: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.level.as_directive()))
}

/// Installs the global subscriber. Returns `false` when a subscriber was
/// already installed, which leaves the existing one in place.
pub fn init_logging(cfg: &LoggingConfig) -> bool {
    let filter = build_filter(cfg);
    let result = match cfg.format {
        LogFormat::Console => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    match result {
        Ok(()) => {
            tracing::debug!(level = %cfg.level, format = ?cfg.format, "logging initialised");
            true
        }
        Err(_) => false,
    }
}
