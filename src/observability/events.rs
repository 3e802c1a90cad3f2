//! Observable lifecycle events for backup and restore
//!
//! Start and end of a whole backup or restore are logged by its
//! `ObservationScope` (`BACKUP_BEGIN`, `RESTORE_COMPLETE`, ...), not here.

use std::fmt;

/// Observable events in mmomni
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Installed configuration loaded
    ConfigLoaded,
    /// Configuration document written
    ConfigSaved,

    // Backup
    /// Database dump written to the staging workspace
    DatabaseDumped,
    /// A root was added to the archive
    ArchiveRootAdded,
    /// Archive finished and flushed
    ArchiveCreated,
    /// Partial archive removed after a failure
    ArchiveDiscarded,

    // Restore
    /// Archive unpacked into the staging workspace
    ArchiveExtracted,
    /// Merged configuration persisted on the host
    ConfigRestored,
    /// Database dump loaded
    DatabaseRestored,
    /// Live data directory replaced
    DataDirectoryRestored,
    /// Archive had no data directory
    DataDirectorySkipped,
}

impl Event {
    /// Returns the event name as used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ConfigSaved => "CONFIG_SAVED",
            Event::DatabaseDumped => "DATABASE_DUMPED",
            Event::ArchiveRootAdded => "ARCHIVE_ROOT_ADDED",
            Event::ArchiveCreated => "ARCHIVE_CREATED",
            Event::ArchiveDiscarded => "ARCHIVE_DISCARDED",
            Event::ArchiveExtracted => "ARCHIVE_EXTRACTED",
            Event::ConfigRestored => "CONFIG_RESTORED",
            Event::DatabaseRestored => "DATABASE_RESTORED",
            Event::DataDirectoryRestored => "DATA_DIRECTORY_RESTORED",
            Event::DataDirectorySkipped => "DATA_DIRECTORY_SKIPPED",
        }
    }

    /// Trace-level events are high-volume detail
    pub fn is_detail(&self) -> bool {
        matches!(self, Event::ArchiveRootAdded)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Event; 11] = [
        Event::ConfigLoaded,
        Event::ConfigSaved,
        Event::DatabaseDumped,
        Event::ArchiveRootAdded,
        Event::ArchiveCreated,
        Event::ArchiveDiscarded,
        Event::ArchiveExtracted,
        Event::ConfigRestored,
        Event::DatabaseRestored,
        Event::DataDirectoryRestored,
        Event::DataDirectorySkipped,
    ];

    #[test]
    fn test_event_names_are_screaming_snake_case() {
        for event in ALL {
            let name = event.as_str();
            assert!(name
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_'));
            assert_eq!(event.to_string(), name);
        }
    }

    #[test]
    fn test_detail_events() {
        assert!(Event::ArchiveRootAdded.is_detail());
        assert!(!Event::ArchiveCreated.is_detail());
    }

    #[test]
    fn test_events_do_not_repeat_operation_scopes() {
        // BACKUP_* and RESTORE_* lines come from the operation scopes
        for event in ALL {
            let name = event.as_str();
            assert!(!name.starts_with("BACKUP_"), "{}", name);
            assert!(!name.starts_with("RESTORE_"), "{}", name);
        }
    }
}
