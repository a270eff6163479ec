//! Session configuration and resource key derivation.
//!
//! A [`ResourceKey`] identifies both the registry entry and the document of a
//! session. Configurations that mean the same thing to the log service derive
//! equal keys; any other pair derives distinct keys.

use std::fmt;

use crate::error::TailError;

/// URI scheme of tail documents.
pub const KEY_SCHEME: &str = "livetail";

static ALL_STREAMS: StreamFilter = StreamFilter::All;

/// Which log streams of the group a session follows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamFilter {
    All,
    Prefix(String),
    Specific(String),
}

impl StreamFilter {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Prefix(_) => "prefix",
            Self::Specific(_) => "specific",
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Prefix(value) | Self::Specific(value) => Some(value),
        }
    }
}

impl fmt::Display for StreamFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Some(value) => write!(f, "{}:{value}", self.kind()),
            None => f.write_str(self.kind()),
        }
    }
}

/// Parameters of one tailing request, produced by the selection wizard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionConfiguration {
    pub region: String,
    pub log_group: String,
    pub stream_filter: Option<StreamFilter>,
    /// Free-text pattern evaluated by the log service.
    pub event_filter: Option<String>,
}

impl SessionConfiguration {
    pub fn new(region: impl Into<String>, log_group: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            log_group: log_group.into(),
            stream_filter: None,
            event_filter: None,
        }
    }

    pub fn with_stream_filter(mut self, filter: StreamFilter) -> Self {
        self.stream_filter = Some(filter);
        self
    }

    pub fn with_event_filter(mut self, pattern: impl Into<String>) -> Self {
        self.event_filter = Some(pattern.into());
        self
    }

    /// Stream filter with `None` normalized to [`StreamFilter::All`].
    pub fn effective_stream_filter(&self) -> &StreamFilter {
        self.stream_filter.as_ref().unwrap_or(&ALL_STREAMS)
    }

    /// Event filter with blank patterns normalized to `None`.
    pub fn effective_event_filter(&self) -> Option<&str> {
        self.event_filter
            .as_deref()
            .filter(|pattern| !pattern.trim().is_empty())
    }

    /// Checks the invariants the wizard is expected to uphold.
    pub fn validate(&self) -> Result<(), TailError> {
        if self.region.trim().is_empty() {
            return Err(TailError::InvalidArgument {
                message: "region is required".into(),
            });
        }
        if self.log_group.trim().is_empty() {
            return Err(TailError::InvalidArgument {
                message: "log group is required".into(),
            });
        }
        if let Some(value) = self.effective_stream_filter().value() {
            if value.is_empty() {
                return Err(TailError::InvalidArgument {
                    message: format!(
                        "{} stream filter requires a value",
                        self.effective_stream_filter().kind()
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn key(&self) -> ResourceKey {
        derive_key(self)
    }
}

/// Identity of a session and of its document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives the resource key of a configuration.
///
/// Format: `livetail:<region>:<log group>?streams=<kind>[:<value>][&filter=<pattern>]`.
/// Every component is escaped so no component can contain a delimiter.
pub fn derive_key(config: &SessionConfiguration) -> ResourceKey {
    let filter = config.effective_stream_filter();
    let mut key = format!(
        "{KEY_SCHEME}:{}:{}?streams={}",
        escape(&config.region),
        escape(&config.log_group),
        filter.kind()
    );
    if let Some(value) = filter.value() {
        key.push(':');
        key.push_str(&escape(value));
    }
    if let Some(pattern) = config.effective_event_filter() {
        key.push_str("&filter=");
        key.push_str(&escape(pattern));
    }
    ResourceKey(key)
}

fn escape(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for ch in component.chars() {
        match ch {
            '%' | ':' | '?' | '&' | '=' => out.push_str(&format!("%{:02X}", ch as u32)),
            _ => out.push(ch),
        }
    }
    out
}
