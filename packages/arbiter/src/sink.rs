//! Event log output.
//!
//! Workers describe what they are doing through [`EventLog`], which stamps each
//! [`Event`] with the run-relative time and hands it to a [`LogSink`]. Sinks are
//! shared by every worker and must serialize writes so lines never interleave.
//! A failing sink never stops the simulation: the failure is reported through the
//! `log` facade and the worker carries on.

use std::{
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use thiserror::Error;

use crate::{ResourceId, WorkerId, clock::RunClock};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("Log sink writer lock was poisoned")]
    Poisoned,
}

/// An order-preserving, line-oriented append target.
pub trait LogSink: Send + Sync {
    /// Appends one worker event line.
    ///
    /// # Errors
    ///
    /// * If the underlying writer fails
    fn emit(&self, worker: WorkerId, elapsed: Duration, message: &str) -> Result<(), SinkError>;

    /// Appends a free-form line, used for run headers and the final summary.
    ///
    /// # Errors
    ///
    /// * If the underlying writer fails
    fn write_line(&self, line: &str) -> Result<(), SinkError>;
}

/// Formats an event the way the event log file stores it.
#[must_use]
pub fn format_event_line(worker: WorkerId, elapsed: Duration, message: &str) -> String {
    format!(
        "Philosopher: {worker}, Time: {} ms, {message}",
        elapsed.as_millis()
    )
}

/// Everything a worker reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Thinking,
    FinishedThinking,
    Hungry,
    PickedUpFork(ResourceId),
    PutDownFork(ResourceId),
    AcquiredForks(ResourceId, ResourceId),
    Eating(Duration),
    FinishedEating,
    Interrupted,
}

impl Event {
    pub const EATING_PREFIX: &'static str = "entering eating state";
    pub const FINISHED_EATING: &'static str = "finished eating";
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thinking => f.write_str("entering thinking state"),
            Self::FinishedThinking => f.write_str("finished thinking, getting hungry"),
            Self::Hungry => f.write_str("entering hungry state"),
            Self::PickedUpFork(fork) => write!(f, "picked up fork {fork}"),
            Self::PutDownFork(fork) => write!(f, "put down fork {fork}"),
            Self::AcquiredForks(left, right) => write!(f, "acquired forks {left} and {right}"),
            Self::Eating(duration) => write!(
                f,
                "{}. Will eat for {} ms.",
                Self::EATING_PREFIX,
                duration.as_millis()
            ),
            Self::FinishedEating => f.write_str(Self::FINISHED_EATING),
            Self::Interrupted => f.write_str("interrupted, leaving the table"),
        }
    }
}

/// The run-scoped front of a [`LogSink`].
#[derive(Clone)]
pub struct EventLog {
    sink: Arc<dyn LogSink>,
    clock: RunClock,
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl EventLog {
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>, clock: RunClock) -> Self {
        Self { sink, clock }
    }

    #[must_use]
    pub const fn clock(&self) -> &RunClock {
        &self.clock
    }

    /// Records one worker event. Sink failures are logged and swallowed here.
    pub fn emit(&self, worker: WorkerId, event: &Event) {
        let elapsed = self.clock.elapsed();
        let message = event.to_string();

        log::trace!("philosopher {worker} @ {}ms: {message}", elapsed.as_millis());

        if let Err(e) = self.sink.emit(worker, elapsed, &message) {
            log::error!("Failed to write event for philosopher {worker} ({message}): {e:?}");
        }
    }

    /// Writes a free-form line. Sink failures are logged and swallowed here.
    pub fn line(&self, line: &str) {
        if let Err(e) = self.sink.write_line(line) {
            log::error!("Failed to write line '{line}': {e:?}");
        }
    }
}

/// One event captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub worker: WorkerId,
    pub elapsed: Duration,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEntry {
    Event(EventRecord),
    Line(String),
}

/// Keeps every entry in memory in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<SinkEntry>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// * If the entries `Mutex` is poisoned
    #[must_use]
    pub fn entries(&self) -> Vec<SinkEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// # Panics
    ///
    /// * If the entries `Mutex` is poisoned
    #[must_use]
    pub fn events(&self) -> Vec<EventRecord> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|entry| match entry {
                SinkEntry::Event(record) => Some(record.clone()),
                SinkEntry::Line(..) => None,
            })
            .collect()
    }

    /// Every entry rendered the way a file sink would write it.
    ///
    /// # Panics
    ///
    /// * If the entries `Mutex` is poisoned
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| match entry {
                SinkEntry::Event(record) => {
                    format_event_line(record.worker, record.elapsed, &record.message)
                }
                SinkEntry::Line(line) => line.clone(),
            })
            .collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, worker: WorkerId, elapsed: Duration, message: &str) -> Result<(), SinkError> {
        self.entries
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push(SinkEntry::Event(EventRecord {
                worker,
                elapsed,
                message: message.to_string(),
            }));
        Ok(())
    }

    fn write_line(&self, line: &str) -> Result<(), SinkError> {
        self.entries
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push(SinkEntry::Line(line.to_string()));
        Ok(())
    }
}
