//! Observability for mmomni
//!
//! Structured JSON log lines and lifecycle scopes for backup and restore.
//!
//! ```ignore
//! use mmomni::observability::{log_event_with_fields, Event, ObservationScope};
//!
//! log_event_with_fields(Event::ArchiveCreated, &[("path", "backup.tgz")]);
//!
//! let scope = ObservationScope::new("RESTORE");
//! // ... do work ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity, LOG_LEVEL_ENV};
pub use scope::{ObservationScope, Timer};

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_detail() {
        Severity::Trace
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}
