use std::time::{Duration, Instant};

/// Shared wall-clock origin and deadline of a run.
///
/// Created once before any worker starts and only read afterwards.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    started: Instant,
    duration: Duration,
}

impl RunClock {
    #[must_use]
    pub fn start(duration: Duration) -> Self {
        Self {
            started: Instant::now(),
            duration,
        }
    }

    #[must_use]
    pub const fn started(&self) -> Instant {
        self.started
    }

    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Time since the run started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.elapsed())
    }

    /// Whether the deadline has been reached. Workers poll this between cycles;
    /// it never preempts a step that is already underway.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.duration
    }
}
