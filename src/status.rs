/// Status file: writes the watcher state as JSON on every state transition.
///
/// Uses atomic write pattern: write to temp file then rename.
use crate::events::{EventKind, LogEvent};
use crate::watcher::{SessionEnd, WatcherState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// The JSON payload written to the status file.
#[derive(Debug, Clone, Serialize)]
pub struct StatusData {
    pub pid: u32,
    pub state: WatcherState,
    pub directory: PathBuf,
    pub retention_days: u32,
    pub deleted: u64,
    pub errors: u64,
    pub warnings: u64,
    pub last_event: Option<String>,
    pub session_start: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
    pub stop_reason: Option<SessionEnd>,
}

/// Errors that can occur while writing the status file.
#[derive(Debug)]
pub enum StatusError {
    Serialize {
        source: serde_json::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusError::Serialize { source } => {
                write!(f, "failed to serialize status: {}", source)
            }
            StatusError::Write { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            StatusError::Rename { from, to, source } => {
                write!(
                    f,
                    "failed to rename {} to {}: {}",
                    from.display(),
                    to.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for StatusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatusError::Serialize { source } => Some(source),
            StatusError::Write { source, .. } => Some(source),
            StatusError::Rename { source, .. } => Some(source),
        }
    }
}

/// Manages the status file on disk.
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Atomically write status data to the status file.
    ///
    /// Writes to a temporary file in the same directory, then renames
    /// so readers never see a partial write.
    pub fn write(&self, data: &StatusData) -> Result<(), StatusError> {
        let json =
            serde_json::to_string_pretty(data).map_err(|e| StatusError::Serialize { source: e })?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp_path = dir.join(format!(".pixsweep.status.tmp.{}", std::process::id()));

        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| StatusError::Write {
            path: tmp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| StatusError::Rename {
            from: tmp_path,
            to: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Accumulates counters from drained events and rewrites the status file.
pub struct StatusTracker {
    file: StatusFile,
    data: StatusData,
}

impl StatusTracker {
    pub fn new(status_path: PathBuf, directory: PathBuf, retention_days: u32) -> Self {
        Self {
            file: StatusFile::new(status_path),
            data: StatusData {
                pid: std::process::id(),
                state: WatcherState::Idle,
                directory,
                retention_days,
                deleted: 0,
                errors: 0,
                warnings: 0,
                last_event: None,
                session_start: None,
                last_update: Utc::now(),
                stop_reason: None,
            },
        }
    }

    /// Record a state transition and write it out.
    pub fn set_state(&mut self, state: WatcherState) {
        if state == WatcherState::Running && self.data.state != WatcherState::Running {
            self.data.session_start = Some(Utc::now());
            self.data.stop_reason = None;
        }
        self.data.state = state;
        self.flush();
    }

    /// Record how the session ended; the state becomes idle.
    pub fn set_stopped(&mut self, reason: Option<SessionEnd>) {
        self.data.stop_reason = reason;
        self.set_state(WatcherState::Idle);
    }

    /// Fold a batch of drained events into the counters. Writes only when
    /// the batch is non-empty.
    pub fn record(&mut self, events: &[LogEvent]) {
        if events.is_empty() {
            return;
        }
        for event in events {
            match event.kind {
                EventKind::Deleted => self.data.deleted += 1,
                EventKind::Error => self.data.errors += 1,
                EventKind::Warning => self.data.warnings += 1,
                EventKind::Info => {}
            }
        }
        self.data.last_event = events.last().map(|e| e.message.clone());
        self.flush();
    }

    pub fn data(&self) -> &StatusData {
        &self.data
    }

    fn flush(&mut self) {
        self.data.last_update = Utc::now();
        if let Err(e) = self.file.write(&self.data) {
            tracing::warn!(
                error = %e,
                path = %self.file.path().display(),
                "failed to write status file"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pixsweep.status");
        let mut tracker = StatusTracker::new(path.clone(), PathBuf::from("/shots"), 7);

        tracker.set_state(WatcherState::Running);

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["pixsweep.status"]);

        let json = read_json(&path);
        assert_eq!(json["state"], "running");
        assert_eq!(json["directory"], "/shots");
        assert_eq!(json["retention_days"], 7);
        assert!(json["session_start"].is_string());
        assert!(json["stop_reason"].is_null());
    }

    #[test]
    fn test_record_counts_event_kinds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.json");
        let mut tracker = StatusTracker::new(path.clone(), PathBuf::from("/shots"), 1);

        tracker.record(&[
            LogEvent::info("Watching folder: /shots"),
            LogEvent::deleted("Deleted a.png (Modified: x)"),
            LogEvent::deleted("Deleted b.png (Modified: x)"),
            LogEvent::error("Error processing c.png: denied"),
        ]);
        tracker.record(&[LogEvent::warning("slow")]);

        let data = tracker.data();
        assert_eq!(data.deleted, 2);
        assert_eq!(data.errors, 1);
        assert_eq!(data.warnings, 1);
        assert_eq!(data.last_event.as_deref(), Some("slow"));
        assert_eq!(read_json(&path)["deleted"], 2);
    }

    #[test]
    fn test_empty_batch_does_not_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.json");
        let mut tracker = StatusTracker::new(path.clone(), PathBuf::from("/shots"), 1);
        tracker.record(&[]);
        assert!(!path.exists());
    }

    #[test]
    fn test_stopped_records_reason() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.json");
        let mut tracker = StatusTracker::new(path.clone(), PathBuf::from("/shots"), 1);

        tracker.set_state(WatcherState::Running);
        tracker.set_stopped(Some(SessionEnd::DirectoryUnavailable));

        let json = read_json(&path);
        assert_eq!(json["state"], "idle");
        assert_eq!(json["stop_reason"], "directory_unavailable");
    }

    #[test]
    fn test_unwritable_location_is_not_fatal() {
        let mut tracker = StatusTracker::new(
            PathBuf::from("/nonexistent-dir/impossible/status.json"),
            PathBuf::from("/shots"),
            1,
        );
        tracker.set_state(WatcherState::Running);
        assert_eq!(tracker.data().state, WatcherState::Running);
    }

    #[test]
    fn test_status_file_write_error_variants() {
        let file = StatusFile::new(PathBuf::from("/nonexistent-dir/impossible/status.json"));
        let tracker = StatusTracker::new(PathBuf::from("unused"), PathBuf::from("/shots"), 1);
        let err = file.write(tracker.data()).unwrap_err();
        assert!(matches!(err, StatusError::Write { .. }));
        assert_eq!(
            file.path(),
            Path::new("/nonexistent-dir/impossible/status.json")
        );
    }
}
