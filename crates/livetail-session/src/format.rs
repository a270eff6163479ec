//! Log record to display line formatting.

use std::fmt;

use chrono::{TimeZone, Utc};

use crate::transport::LogRecord;

/// Timestamp layout of display lines (UTC, 24h).
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// One formatted, newline-terminated unit of document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine(String);

impl DisplayLine {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of document lines this unit occupies.
    pub fn line_count(&self) -> usize {
        self.0.matches('\n').count()
    }
}

impl fmt::Display for DisplayLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Formats a record as `HH:MM:SS<TAB>message\n`.
///
/// Records without a timestamp or with a missing or empty message yield
/// `None`, as do timestamps outside chrono's representable range.
pub fn format_record(record: &LogRecord) -> Option<DisplayLine> {
    let millis = record.timestamp?;
    let message = record.message.as_deref().filter(|m| !m.is_empty())?;
    let time = Utc.timestamp_millis_opt(millis).single()?;

    let mut line = format!("{}\t{message}", time.format(TIMESTAMP_FORMAT));
    if !line.ends_with('\n') {
        line.push('\n');
    }
    Some(DisplayLine(line))
}

/// Formats a batch, dropping malformed records.
pub fn format_records(records: &[LogRecord]) -> Vec<DisplayLine> {
    records.iter().filter_map(format_record).collect()
}
