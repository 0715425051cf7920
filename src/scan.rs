//! One scan cycle over the monitored directory.
//!
//! Listing the directory and sweeping the listed candidates are separate
//! steps: a candidate may vanish between the two, and that must stay a
//! per-file error rather than a scan failure.

use crate::events::{EventSink, LogEvent};
use crate::retention;
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};

/// Totals for one completed scan cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Image-named entries considered.
    pub candidates: usize,
    pub deleted: usize,
    /// Per-file failures (stat or delete).
    pub errors: usize,
}

/// Scan-level failures. Per-file failures are reported as events instead.
#[derive(Debug)]
pub enum ScanError {
    /// The monitored directory is missing, not a directory, or not listable.
    /// Fatal to the watch session.
    Unavailable {
        path: PathBuf,
        source: std::io::Error,
    },
    /// An entry could not be read while enumerating the directory.
    Enumerate {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ScanError {
    /// Whether the session must stop rather than retry on the next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::Unavailable { .. })
    }
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::Unavailable { path, source } => {
                write!(
                    f,
                    "monitored folder {} is unavailable: {}",
                    path.display(),
                    source
                )
            }
            ScanError::Enumerate { path, source } => {
                write!(
                    f,
                    "failed to enumerate entries of {}: {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::Unavailable { source, .. } => Some(source),
            ScanError::Enumerate { source, .. } => Some(source),
        }
    }
}

/// List the immediate entries of `dir` whose names carry an image extension.
///
/// Only names are inspected here; nothing is stat'ed. Order follows the
/// directory listing.
pub fn list_candidates(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ScanError::Unavailable {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScanError::Enumerate {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if retention::is_image_file(&path) {
            candidates.push(path);
        }
    }
    Ok(candidates)
}

/// Stat each candidate and delete the expired ones, reporting through `sink`.
///
/// Failures on one file are reported and never stop the sweep. Entries are
/// inspected without following symlinks; anything that is not a regular
/// file is left alone.
pub fn sweep_candidates(
    candidates: &[PathBuf],
    now: DateTime<Utc>,
    retention_days: u32,
    sink: &dyn EventSink,
) -> ScanReport {
    let mut report = ScanReport {
        candidates: candidates.len(),
        ..Default::default()
    };

    for path in candidates {
        let name = display_name(path);

        let modified_at = match modified_time(path) {
            Ok(Some(t)) => t,
            Ok(None) => {
                tracing::debug!(file = %path.display(), "skipping non-regular entry");
                continue;
            }
            Err(e) => {
                report.errors += 1;
                sink.emit(LogEvent::error(format!("Error processing {name}: {e}")));
                continue;
            }
        };

        if !retention::is_expired(modified_at, now, retention_days) {
            continue;
        }

        match std::fs::remove_file(path) {
            Ok(()) => {
                report.deleted += 1;
                let local: DateTime<Local> = modified_at.into();
                sink.emit(LogEvent::deleted(format!(
                    "Deleted {name} (Modified: {})",
                    local.format("%Y-%m-%d %H:%M:%S")
                )));
            }
            Err(e) => {
                report.errors += 1;
                sink.emit(LogEvent::error(format!("Error processing {name}: {e}")));
            }
        }
    }

    report
}

/// Run a full scan cycle: list, then sweep.
pub fn scan_once(
    dir: &Path,
    now: DateTime<Utc>,
    retention_days: u32,
    sink: &dyn EventSink,
) -> Result<ScanReport, ScanError> {
    let candidates = list_candidates(dir)?;
    Ok(sweep_candidates(&candidates, now, retention_days, sink))
}

/// Modification time of a regular file, `None` for anything else.
fn modified_time(path: &Path) -> std::io::Result<Option<DateTime<Utc>>> {
    let metadata = std::fs::symlink_metadata(path)?;
    if !metadata.file_type().is_file() {
        return Ok(None);
    }
    Ok(Some(metadata.modified()?.into()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
