use crate::log::log_level::LogLevel;
use std::time::{SystemTime, UNIX_EPOCH};

/// Represents a single log record queued for the logger worker.
#[derive(Debug, Clone)]
pub struct LogMsg {
    /// Severity of the record.
    pub level: LogLevel,
    /// Wall-clock timestamp in milliseconds since the UNIX epoch.
    pub ts_ms: u128,
    /// Rendered message text.
    pub text: String,
    /// Origin of the record, normally `module_path!()`.
    pub target: &'static str,
}

impl LogMsg {
    /// Creates a record stamped with the current time.
    pub fn new(level: LogLevel, text: impl Into<String>, target: &'static str) -> Self {
        Self {
            level,
            ts_ms: now_millis(),
            text: text.into(),
            target,
        }
    }
}

/// Milliseconds since the UNIX epoch, or 0 if the clock is before it.
pub fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
