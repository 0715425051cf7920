//! Background directory watcher.
//!
//! A [`DirectoryWatcher`] owns at most one watch session: a tokio task that
//! repeats scan cycles over the configured directory until its cancellation
//! token fires or the directory becomes unavailable.

use crate::events::{EventSink, LogEvent};
use crate::scan;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default pause between scan cycles.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Settings for one watch session. Fixed for the session's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    pub directory: PathBuf,
    pub retention_days: u32,
    pub scan_interval: Duration,
}

impl WatchConfig {
    pub fn new(directory: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            directory: directory.into(),
            retention_days,
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }

    pub fn with_scan_interval(mut self, scan_interval: Duration) -> Self {
        self.scan_interval = scan_interval;
        self
    }

    /// Check the preconditions the watcher assumes at start.
    ///
    /// The watcher itself does not call this; it only tolerates the
    /// directory disappearing later.
    pub fn validate(&self) -> Result<(), InvalidWatchConfig> {
        if self.scan_interval.is_zero() {
            return Err(InvalidWatchConfig::ZeroInterval);
        }
        match std::fs::metadata(&self.directory) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(InvalidWatchConfig::NotADirectory {
                path: self.directory.clone(),
            }),
            Err(e) => Err(InvalidWatchConfig::Missing {
                path: self.directory.clone(),
                source: e,
            }),
        }
    }
}

#[derive(Debug)]
pub enum InvalidWatchConfig {
    Missing {
        path: PathBuf,
        source: std::io::Error,
    },
    NotADirectory {
        path: PathBuf,
    },
    ZeroInterval,
}

impl std::fmt::Display for InvalidWatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidWatchConfig::Missing { path, source } => {
                write!(f, "folder {} does not exist: {}", path.display(), source)
            }
            InvalidWatchConfig::NotADirectory { path } => {
                write!(f, "{} is not a directory", path.display())
            }
            InvalidWatchConfig::ZeroInterval => write!(f, "scan interval must be positive"),
        }
    }
}

impl std::error::Error for InvalidWatchConfig {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InvalidWatchConfig::Missing { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherState {
    Idle,
    Running,
}

/// Why a session's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    /// Stop was requested.
    Cancelled,
    /// The monitored directory could not be listed.
    DirectoryUnavailable,
    /// The session task panicked or was aborted by the runtime.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Finished(SessionEnd),
    /// The task was still running when the timeout elapsed. Its token is
    /// cancelled and the session stays attached until the loop exits.
    TimedOut,
    NotRunning,
}

struct WatchSession {
    token: CancellationToken,
    task: JoinHandle<SessionEnd>,
}

impl WatchSession {
    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Watches one directory and deletes expired images in the background.
pub struct DirectoryWatcher {
    config: WatchConfig,
    sink: Arc<dyn EventSink>,
    session: Option<WatchSession>,
}

impl DirectoryWatcher {
    pub fn new(config: WatchConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            sink,
            session: None,
        }
    }

    /// Spawn the scan loop. Must be called from within a tokio runtime.
    ///
    /// Starting while a session is running emits an informational event and
    /// spawns nothing. A session that already ended on its own is replaced.
    pub fn start(&mut self) -> StartOutcome {
        if let Some(session) = &self.session {
            if !session.is_finished() {
                self.sink.emit(LogEvent::info(
                    "Already watching. Please stop the current session first.",
                ));
                return StartOutcome::AlreadyRunning;
            }
            tracing::debug!("reaping finished watch session before restart");
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(watch_loop(
            self.config.clone(),
            Arc::clone(&self.sink),
            token.clone(),
        ));
        tracing::info!(
            directory = %self.config.directory.display(),
            retention_days = self.config.retention_days,
            interval_secs = self.config.scan_interval.as_secs_f64(),
            "watch session started"
        );
        self.session = Some(WatchSession { token, task });
        StartOutcome::Started
    }

    /// Request the running session to stop. Does not wait; see [`join`](Self::join).
    pub fn stop(&self) {
        match &self.session {
            Some(session) if !session.is_finished() => {
                if !session.token.is_cancelled() {
                    tracing::info!("stopping file watcher signaled");
                }
                session.token.cancel();
            }
            _ => self.sink.emit(LogEvent::info(
                "Not currently watching or watcher not initialized.",
            )),
        }
    }

    /// Wait up to `timeout` for the session task to finish and release it.
    ///
    /// A task that outlives the timeout is reported as a warning event, not
    /// an error. Its session is kept, so the watcher stays `Running` and
    /// refuses a new start until the old loop has actually exited.
    pub async fn join(&mut self, timeout: Duration) -> JoinOutcome {
        let Some(session) = self.session.as_mut() else {
            return JoinOutcome::NotRunning;
        };

        let waited = tokio::time::timeout(timeout, &mut session.task).await;
        match waited {
            Ok(joined) => {
                self.session = None;
                match joined {
                    Ok(end) => JoinOutcome::Finished(end),
                    Err(e) => {
                        tracing::error!(error = %e, "watch task failed");
                        JoinOutcome::Finished(SessionEnd::Aborted)
                    }
                }
            }
            Err(_) => {
                session.token.cancel();
                let secs = timeout.as_secs_f64();
                self.sink.emit(LogEvent::warning(format!(
                    "Watcher task did not terminate within {secs}s."
                )));
                tracing::warn!(timeout_secs = secs, "watch task did not terminate in time");
                JoinOutcome::TimedOut
            }
        }
    }

    pub fn state(&self) -> WatcherState {
        match &self.session {
            Some(session) if !session.is_finished() => WatcherState::Running,
            _ => WatcherState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == WatcherState::Running
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.token.cancel();
        }
    }
}

async fn watch_loop(
    config: WatchConfig,
    sink: Arc<dyn EventSink>,
    token: CancellationToken,
) -> SessionEnd {
    sink.emit(LogEvent::info(format!(
        "Watching folder: {}",
        config.directory.display()
    )));

    let end = loop {
        if token.is_cancelled() {
            break SessionEnd::Cancelled;
        }

        let pause = match run_scan(&config, &sink).await {
            Ok(report) => {
                tracing::debug!(
                    candidates = report.candidates,
                    deleted = report.deleted,
                    errors = report.errors,
                    "scan cycle complete"
                );
                config.scan_interval
            }
            Err(ScanFailure::Scan(e)) if e.is_fatal() => {
                tracing::error!(error = %e, "monitored folder not available, stopping watch");
                sink.emit(LogEvent::error(unavailable_message(&config.directory, &e)));
                break SessionEnd::DirectoryUnavailable;
            }
            Err(failure) => {
                tracing::error!(
                    error = %failure,
                    directory = %config.directory.display(),
                    "error watching folder, backing off"
                );
                sink.emit(LogEvent::error(format!("Error in watcher: {failure}")));
                config.scan_interval.saturating_mul(2)
            }
        };

        if token.is_cancelled() {
            break SessionEnd::Cancelled;
        }

        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(pause) => {}
        }
    };

    sink.emit(LogEvent::info("File watcher stopped."));
    end
}

#[derive(Debug)]
enum ScanFailure {
    Scan(scan::ScanError),
    Task(tokio::task::JoinError),
}

impl std::fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanFailure::Scan(e) => write!(f, "{e}"),
            ScanFailure::Task(e) => write!(f, "scan task failed: {e}"),
        }
    }
}

/// Run one scan cycle on the blocking pool.
async fn run_scan(
    config: &WatchConfig,
    sink: &Arc<dyn EventSink>,
) -> Result<scan::ScanReport, ScanFailure> {
    let directory = config.directory.clone();
    let retention_days = config.retention_days;
    let sink = Arc::clone(sink);
    let now = Utc::now();

    tokio::task::spawn_blocking(move || {
        scan::scan_once(&directory, now, retention_days, sink.as_ref())
    })
    .await
    .map_err(ScanFailure::Task)?
    .map_err(ScanFailure::Scan)
}

fn unavailable_message(directory: &Path, error: &scan::ScanError) -> String {
    let cause = match error {
        scan::ScanError::Unavailable { source, .. }
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            "not found".to_string()
        }
        scan::ScanError::Unavailable { source, .. } => source.to_string(),
        other => other.to_string(),
    };
    format!(
        "Error: Monitored folder {} is unavailable ({cause}). Stopping watch.",
        directory.display()
    )
}
