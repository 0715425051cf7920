//! Process logging: a stderr layer plus one log file per run.
//!
//! Per-run files live in the log directory as
//! `app_session_%Y-%m-%d_%H-%M-%S.log`; older ones can be pruned.

use chrono::{DateTime, Local};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const SESSION_PREFIX: &str = "app_session_";
const SESSION_SUFFIX: &str = ".log";

/// How chatty stderr should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    /// Default stderr directives when `RUST_LOG` is unset. Sink events are
    /// printed by the display loop, so their mirror target stays off here.
    fn stderr_directives(self) -> String {
        let level = match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "pixsweep=debug",
        };
        format!("{level},{}=off", crate::events::EVENT_TARGET)
    }

    fn file_level(self) -> LevelFilter {
        match self {
            Verbosity::Verbose => LevelFilter::DEBUG,
            _ => LevelFilter::INFO,
        }
    }
}

/// The directory holding per-run log files.
#[derive(Debug, Clone)]
pub struct LogDir {
    root: PathBuf,
}

impl LogDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the log file for a run started at `started`.
    pub fn session_log(&self, started: DateTime<Local>) -> PathBuf {
        self.root.join(format!(
            "{SESSION_PREFIX}{}{SESSION_SUFFIX}",
            started.format("%Y-%m-%d_%H-%M-%S")
        ))
    }

    /// Create the directory if missing.
    /// Returns Ok(true) if it was created, Ok(false) if it already existed.
    pub fn init(&self) -> std::io::Result<bool> {
        let created = !self.root.exists();
        std::fs::create_dir_all(&self.root)?;
        Ok(created)
    }

    /// Create this run's log file, truncating any file with the same name.
    pub fn open_session_log(&self, started: DateTime<Local>) -> std::io::Result<(PathBuf, File)> {
        self.init()?;
        let path = self.session_log(started);
        let file = File::create(&path)?;
        Ok((path, file))
    }

    /// Per-run log files, oldest first.
    pub fn session_logs(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut logs: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(SESSION_PREFIX) && n.ends_with(SESSION_SUFFIX))
            })
            .collect();
        // Timestamps in the names sort chronologically
        logs.sort();
        Ok(logs)
    }

    /// Delete all but the newest `keep` per-run logs. `keep = 0` keeps everything.
    ///
    /// Returns the number of files removed. Failures on single files are
    /// logged and skipped.
    pub fn prune(&self, keep: usize) -> std::io::Result<usize> {
        if keep == 0 {
            return Ok(0);
        }
        let logs = self.session_logs()?;
        let excess = logs.len().saturating_sub(keep);
        let mut removed = 0;
        for path in &logs[..excess] {
            match std::fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    error = %e,
                    file = %path.display(),
                    "failed to remove old session log"
                ),
            }
        }
        Ok(removed)
    }
}

/// Install the global subscriber: stderr always, plus `log_file` when given.
pub fn init_tracing(verbosity: Verbosity, log_file: Option<File>) {
    let stderr_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.stderr_directives()));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(verbosity.file_level())
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn started(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 5, 4, h, m, s).unwrap()
    }

    #[test]
    fn test_session_log_name() {
        let dir = LogDir::new("app_run_logs");
        assert_eq!(
            dir.session_log(started(9, 8, 7)),
            PathBuf::from("app_run_logs/app_session_2026-05-04_09-08-07.log")
        );
    }

    #[test]
    fn test_init_reports_creation() {
        let tmp = tempdir().unwrap();
        let dir = LogDir::new(tmp.path().join("logs"));
        assert!(dir.init().unwrap());
        assert!(!dir.init().unwrap());
        assert!(dir.root().is_dir());
    }

    #[test]
    fn test_open_session_log_creates_directory_and_file() {
        let tmp = tempdir().unwrap();
        let dir = LogDir::new(tmp.path().join("nested/logs"));
        let (path, _file) = dir.open_session_log(started(10, 0, 0)).unwrap();
        assert!(path.exists());
        assert_eq!(dir.session_logs().unwrap(), vec![path]);
    }

    #[test]
    fn test_session_logs_ignores_other_files() {
        let tmp = tempdir().unwrap();
        let dir = LogDir::new(tmp.path());
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("app_session_broken.txt"), "x").unwrap();
        dir.open_session_log(started(10, 0, 0)).unwrap();
        assert_eq!(dir.session_logs().unwrap().len(), 1);
    }

    #[test]
    fn test_prune_keeps_newest() {
        let tmp = tempdir().unwrap();
        let dir = LogDir::new(tmp.path());
        for minute in 0..5 {
            dir.open_session_log(started(12, minute, 0)).unwrap();
        }

        assert_eq!(dir.prune(2).unwrap(), 3);

        let names: Vec<String> = dir
            .session_logs()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "app_session_2026-05-04_12-03-00.log",
                "app_session_2026-05-04_12-04-00.log"
            ]
        );
    }

    #[test]
    fn test_prune_zero_keeps_all() {
        let tmp = tempdir().unwrap();
        let dir = LogDir::new(tmp.path());
        for minute in 0..3 {
            dir.open_session_log(started(12, minute, 0)).unwrap();
        }
        assert_eq!(dir.prune(0).unwrap(), 0);
        assert_eq!(dir.session_logs().unwrap().len(), 3);
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
        assert_eq!(
            Verbosity::Normal.stderr_directives(),
            "warn,pixsweep::events=off"
        );
    }
}
