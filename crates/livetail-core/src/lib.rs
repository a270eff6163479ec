//! livetail-core: settings and logging bootstrap shared by live tail hosts.

pub mod logging;
pub mod settings;

pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
pub use settings::{ConfigError, LoggingSettings, TailSettings};

/// Stable crate label used for bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "livetail-core"
}
