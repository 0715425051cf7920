//! Front end for the watcher: feeds sink events through a bounded channel
//! to the console, drives start/stop, and keeps the status file current.

use crate::config::SweepConfig;
use crate::events::{self, EventChannel, EventKind, EventSink, LogEvent};
use crate::scan::{self, ScanError, ScanReport};
use crate::signals::{ShutdownSignal, SignalHandler};
use crate::status::StatusTracker;
use crate::watcher::{DirectoryWatcher, JoinOutcome, SessionEnd, WatchConfig, WatcherState};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;

/// How a watch run ended, from the process's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stopped on request and the watch task finished.
    Stopped,
    /// Stopped on request, but the task had to be abandoned.
    Abandoned,
    /// The session ended on its own (monitored folder unavailable).
    WatcherEnded,
}

impl RunOutcome {
    pub fn exit_code(self) -> u8 {
        match self {
            RunOutcome::Stopped => 0,
            RunOutcome::WatcherEnded => 1,
            RunOutcome::Abandoned => 130,
        }
    }
}

enum StopTrigger {
    Signal(ShutdownSignal),
    WatcherEnded,
}

/// A sink that records every event in the process log and queues it for display.
pub fn channel_sink(channel: Arc<EventChannel>) -> Arc<dyn EventSink> {
    Arc::new(move |event: LogEvent| {
        events::trace_event(&event);
        channel.push(event);
    })
}

/// Drains the event channel to stdout.
struct Console {
    channel: Arc<EventChannel>,
    quiet: bool,
    dropped: u64,
    status: Option<StatusTracker>,
}

impl Console {
    fn new(channel: Arc<EventChannel>, quiet: bool, status: Option<StatusTracker>) -> Self {
        Self {
            channel,
            quiet,
            dropped: 0,
            status,
        }
    }

    fn flush(&mut self) {
        let batch = self.channel.drain();

        let dropped = self.channel.dropped();
        if dropped > self.dropped {
            tracing::warn!(
                count = dropped - self.dropped,
                capacity = self.channel.capacity(),
                "display fell behind, events dropped"
            );
            self.dropped = dropped;
        }

        for event in &batch {
            // Quiet mode: only deletions and problems
            if self.quiet && event.kind == EventKind::Info {
                continue;
            }
            println!("{event}");
        }

        if let Some(status) = &mut self.status {
            status.record(&batch);
        }
    }

    fn set_state(&mut self, state: WatcherState) {
        if let Some(status) = &mut self.status {
            status.set_state(state);
        }
    }

    fn set_stopped(&mut self, reason: Option<SessionEnd>) {
        if let Some(status) = &mut self.status {
            status.set_stopped(reason);
            let data = status.data();
            tracing::info!(
                deleted = data.deleted,
                errors = data.errors,
                warnings = data.warnings,
                stop_reason = ?data.stop_reason,
                "watch summary"
            );
        }
    }
}

/// Watch until a shutdown signal arrives or the session ends on its own.
pub async fn run(
    config: &SweepConfig,
    watch: WatchConfig,
    quiet: bool,
) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    let channel = Arc::new(EventChannel::with_capacity(config.events.capacity));
    let sink = channel_sink(Arc::clone(&channel));
    let status = config
        .status
        .file
        .clone()
        .map(|path| StatusTracker::new(path, watch.directory.clone(), watch.retention_days));
    let mut console = Console::new(Arc::clone(&channel), quiet, status);

    let mut signals = SignalHandler::install()?;
    let mut watcher = DirectoryWatcher::new(watch, Arc::clone(&sink));
    watcher.start();
    console.set_state(WatcherState::Running);

    let mut ticker = tokio::time::interval(config.display_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let trigger = loop {
        let trigger = tokio::select! {
            _ = ticker.tick() => {
                console.flush();
                (!watcher.is_running()).then_some(StopTrigger::WatcherEnded)
            }
            sig = signals.recv() => Some(StopTrigger::Signal(sig)),
        };
        if let Some(trigger) = trigger {
            break trigger;
        }
    };

    let timeout = config.join_timeout();
    let (outcome, reason) = match trigger {
        StopTrigger::Signal(sig) => {
            tracing::info!(signal = %sig, "shutdown requested");
            sink.emit(LogEvent::info("Stopping file watcher..."));
            watcher.stop();

            let joined = tokio::select! {
                joined = watcher.join(timeout) => Some(joined),
                second = signals.recv() => {
                    tracing::warn!(signal = %second, "second signal, not waiting for the watcher");
                    None
                }
            };
            let result = match joined {
                Some(JoinOutcome::Finished(end)) => (RunOutcome::Stopped, Some(end)),
                Some(JoinOutcome::NotRunning) => (RunOutcome::Stopped, None),
                Some(JoinOutcome::TimedOut) | None => (RunOutcome::Abandoned, None),
            };
            sink.emit(LogEvent::info("Stopped watching folder."));
            result
        }
        StopTrigger::WatcherEnded => match watcher.join(timeout).await {
            JoinOutcome::Finished(end) => (RunOutcome::WatcherEnded, Some(end)),
            _ => (RunOutcome::WatcherEnded, None),
        },
    };

    console.flush();
    console.set_stopped(reason);
    Ok(outcome)
}

/// Run a single scan cycle synchronously and report it.
pub fn run_once(
    config: &SweepConfig,
    watch: &WatchConfig,
    quiet: bool,
) -> Result<ScanReport, ScanError> {
    let channel = Arc::new(EventChannel::with_capacity(config.events.capacity));
    let sink = channel_sink(Arc::clone(&channel));
    let status = config
        .status
        .file
        .clone()
        .map(|path| StatusTracker::new(path, watch.directory.clone(), watch.retention_days));
    let mut console = Console::new(channel, quiet, status);

    let result = scan::scan_once(
        &watch.directory,
        Utc::now(),
        watch.retention_days,
        sink.as_ref(),
    );
    if let Err(e) = &result {
        sink.emit(LogEvent::error(format!("Error: {e}")));
    }

    console.flush();
    console.set_stopped(None);
    result
}
