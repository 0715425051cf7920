/// Watcher events and the sinks that receive them.
///
/// The watcher reports every action as a [`LogEvent`] through an [`EventSink`].
/// [`EventChannel`] is the bounded, thread-safe queue the front end drains
/// for display.
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Target under which sink events are mirrored into `tracing`.
pub const EVENT_TARGET: &str = "pixsweep::events";

/// Default number of events an [`EventChannel`] retains.
pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Info,
    Deleted,
    Error,
    Warning,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Info => "info",
            EventKind::Deleted => "deleted",
            EventKind::Error => "error",
            EventKind::Warning => "warning",
        };
        f.write_str(s)
    }
}

/// A single reported action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub kind: EventKind,
    pub message: String,
}

impl LogEvent {
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(EventKind::Info, message)
    }

    pub fn deleted(message: impl Into<String>) -> Self {
        Self::new(EventKind::Deleted, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(EventKind::Warning, message)
    }
}

/// Flattened text form used at the display boundary: `"{timestamp} - {message}"`.
impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.message
        )
    }
}

/// Receiver of watcher events.
///
/// Implementations are invoked from the watcher's background task while the
/// front end may concurrently read what was delivered earlier, so they must
/// be `Send + Sync`.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

impl<F> EventSink for F
where
    F: Fn(LogEvent) + Send + Sync,
{
    fn emit(&self, event: LogEvent) {
        self(event)
    }
}

/// Record an event in the process log.
pub fn trace_event(event: &LogEvent) {
    match event.kind {
        EventKind::Info | EventKind::Deleted => {
            tracing::info!(target: EVENT_TARGET, kind = %event.kind, "{}", event.message)
        }
        EventKind::Warning => {
            tracing::warn!(target: EVENT_TARGET, kind = %event.kind, "{}", event.message)
        }
        EventKind::Error => {
            tracing::error!(target: EVENT_TARGET, kind = %event.kind, "{}", event.message)
        }
    }
}

/// Fixed-capacity FIFO of events.
///
/// Producers push from any thread; the consumer drains. When full, the
/// oldest event is evicted and counted in [`EventChannel::dropped`].
#[derive(Debug)]
pub struct EventChannel {
    capacity: usize,
    state: Mutex<ChannelState>,
}

#[derive(Debug, Default)]
struct ChannelState {
    queue: VecDeque<LogEvent>,
    dropped: u64,
}

impl EventChannel {
    /// Create a channel holding at most `capacity` events (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(ChannelState {
                queue: VecDeque::with_capacity(capacity),
                dropped: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event, evicting the oldest one if the channel is full.
    pub fn push(&self, event: LogEvent) {
        let mut state = self.lock();
        if state.queue.len() == self.capacity {
            state.queue.pop_front();
            state.dropped += 1;
        }
        state.queue.push_back(event);
    }

    /// Remove and return every queued event, oldest first.
    pub fn drain(&self) -> Vec<LogEvent> {
        self.lock().queue.drain(..).collect()
    }

    /// Number of events evicted because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    // A panicking producer must not take the display down with it.
    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
impl EventChannel {
    /// Copy of the queued events without removing them.
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.lock().queue.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventSink for EventChannel {
    fn emit(&self, event: LogEvent) {
        self.push(event);
    }
}
