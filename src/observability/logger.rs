//! Structured JSON logger for mmomni
//!
//! - One log line = one event
//! - `event` and `severity` keys plus caller fields, keys in sorted order
//! - Synchronous, written to stderr so command output on stdout stays clean
//!
//! The minimum severity is read once from `MMOMNI_LOG`
//! (`trace`, `info`, `warn`, `error` or `off`; default `info`).

use std::fmt;
use std::io::{self, Write};
use std::sync::OnceLock;

use serde_json::{Map, Value};

/// Environment variable holding the minimum severity
pub const LOG_LEVEL_ENV: &str = "MMOMNI_LOG";

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    /// Parse a level name; `None` means logging is switched off
    fn parse_threshold(value: &str) -> Option<Severity> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Severity::Trace),
            "warn" => Some(Severity::Warn),
            "error" => Some(Severity::Error),
            "off" | "none" => None,
            _ => Some(Severity::Info),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn threshold() -> Option<Severity> {
    static THRESHOLD: OnceLock<Option<Severity>> = OnceLock::new();
    *THRESHOLD.get_or_init(|| match std::env::var(LOG_LEVEL_ENV) {
        Ok(value) => Severity::parse_threshold(&value),
        Err(_) => Some(Severity::Info),
    })
}

/// A structured logger that outputs JSON lines
pub struct Logger;

impl Logger {
    /// Log an event with the given severity and fields
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        match threshold() {
            Some(min) if severity >= min => {
                Self::log_to_writer(severity, event, fields, &mut io::stderr())
            }
            _ => {}
        }
    }

    fn log_to_writer<W: Write>(
        severity: Severity,
        event: &str,
        fields: &[(&str, &str)],
        writer: &mut W,
    ) {
        let _ = writer.write_all(Self::format_line(severity, event, fields).as_bytes());
        let _ = writer.flush();
    }

    /// Render one log line, newline included
    pub fn format_line(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut object = Map::new();
        for (key, value) in fields {
            object.insert((*key).to_string(), Value::String((*value).to_string()));
        }
        // Reserved keys win over caller fields of the same name
        object.insert("event".to_string(), Value::String(event.to_string()));
        object.insert(
            "severity".to_string(),
            Value::String(severity.as_str().to_string()),
        );

        let mut line = Value::Object(object).to_string();
        line.push('\n');
        line
    }

    /// Log at TRACE level
    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }
}
