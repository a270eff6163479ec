//! Settings read by a live tail host before it starts sessions.
//!
//! Defaults, validation, YAML file loading, environment variable overrides,
//! and the settings file search path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::logging::{LogFormat, LogLevel};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default line budget of a tail document.
pub const DEFAULT_MAX_LINES: usize = 10_000;

/// Smallest line budget a user may configure.
pub const MIN_MAX_LINES: usize = 1_000;

/// Largest line budget a user may configure.
pub const MAX_MAX_LINES: usize = 15_000;

/// Default refresh interval of the session duration indicator.
pub const DEFAULT_STATUS_REFRESH_MS: u64 = 500;

/// File name looked up in each settings directory.
pub const SETTINGS_FILE_NAME: &str = "livetail.yaml";

/// Environment variable overriding `max_lines`.
pub const ENV_MAX_LINES: &str = "LIVETAIL_MAX_LINES";

/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "LIVETAIL_LOG_LEVEL";

/// Environment variable overriding `logging.format`.
pub const ENV_LOG_FORMAT: &str = "LIVETAIL_LOG_FORMAT";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to produce a usable [`TailSettings`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Root settings for live tailing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TailSettings {
    /// Maximum number of lines kept in a tail document.
    pub max_lines: usize,
    /// Interval of the duration indicator, in milliseconds.
    pub status_refresh_ms: u64,
    /// Clear the document content when its session stops.
    pub clear_on_stop: bool,
    pub logging: LoggingSettings,
}

impl Default for TailSettings {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_LINES,
            status_refresh_ms: DEFAULT_STATUS_REFRESH_MS,
            clear_on_stop: false,
            logging: LoggingSettings::default(),
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "console".into(),
        }
    }
}

impl TailSettings {
    /// Parses settings from YAML. An empty document yields the defaults.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(raw)?;
        settings.validate().map_err(ConfigError::Invalid)?;
        Ok(settings)
    }

    /// Loads and validates a settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Loads the first settings file on the search path (defaults when none
    /// exists), then applies environment overrides.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let mut settings = match find_settings_file() {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    /// Applies `LIVETAIL_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup, then re-validates.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_LINES) {
            self.max_lines = parse_max_lines(&raw)
                .map_err(|err| ConfigError::Invalid(format!("{ENV_MAX_LINES}: {err}")))?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = format;
        }
        self.validate().map_err(ConfigError::Invalid)
    }

    /// Validates the settings, returning an error message on failure.
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_MAX_LINES..=MAX_MAX_LINES).contains(&self.max_lines) {
            return Err(format!(
                "max_lines must be between {MIN_MAX_LINES} and {MAX_MAX_LINES}, got {}",
                self.max_lines
            ));
        }
        if self.status_refresh_ms < 50 {
            return Err("status_refresh_ms must be at least 50".into());
        }

        if LogLevel::try_parse(&self.logging.level).is_none() {
            return Err(
                "logging.level must be one of trace, debug, info, warn (warning), error".into(),
            );
        }
        if LogFormat::try_parse(&self.logging.format).is_none() {
            return Err("logging.format must be one of console, json".into());
        }

        Ok(())
    }

    /// Duration indicator refresh interval.
    pub fn status_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.status_refresh_ms)
    }
}

/// Parses a user-entered line budget, rejecting non-numeric or out-of-range
/// input.
pub fn parse_max_lines(input: &str) -> Result<usize, String> {
    let value: usize = input
        .trim()
        .parse()
        .map_err(|_| format!("{input:?} is not a whole number"))?;
    if !(MIN_MAX_LINES..=MAX_MAX_LINES).contains(&value) {
        return Err(format!(
            "{value} is outside {MIN_MAX_LINES}..={MAX_MAX_LINES}"
        ));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// File discovery
// ---------------------------------------------------------------------------

/// Search for a settings file in the standard locations.
/// Returns `None` if no settings file is found.
pub fn find_settings_file() -> Option<PathBuf> {
    settings_search_paths()
        .into_iter()
        .map(|dir| dir.join(SETTINGS_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

fn settings_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(Path::new(&xdg).join("livetail"));
    }

    let home = home_dir();
    if home.as_os_str() != "" {
        paths.push(home.join(".config/livetail"));
    }

    paths.push(PathBuf::from("."));

    paths
}

fn home_dir() -> PathBuf {
    #[allow(deprecated)]
    std::env::home_dir().unwrap_or_else(|| PathBuf::from("/"))
}
