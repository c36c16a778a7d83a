//! Simulation parameters.
//!
//! The defaults reproduce the classic run: four philosophers for one minute,
//! thinking 10 ms at a time, eating 10–40 ms and backing off 50–100 ms after a
//! failed fork probe. Every duration is expressed in whole milliseconds on the
//! wire so a config file reads naturally:
//!
//! ```json5
//! {
//!     workers: 5,
//!     runDurationMs: 10000,
//!     thinkDurationMs: 10,
//!     eatDurationMs: { minMs: 10, maxMs: 40 },
//!     backoffMs: { minMs: 50, maxMs: 100 },
//!     seed: 42,
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use thiserror::Error;

use crate::WorkerId;

/// Smallest ring that still has contention.
pub const MIN_WORKERS: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("At least 2 workers are required, got {0}")]
    TooFewWorkers(usize),
    #[error("Run duration must be greater than zero")]
    ZeroRunDuration,
    #[error("Invalid {name} range: min {min_ms}ms is greater than max {max_ms}ms")]
    InvertedRange {
        name: &'static str,
        min_ms: u64,
        max_ms: u64,
    },
}

/// An inclusive range of whole milliseconds that random durations are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DurationRange {
    #[must_use]
    pub const fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    #[must_use]
    pub const fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    #[must_use]
    pub const fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    #[must_use]
    pub fn contains(&self, duration: Duration) -> bool {
        (self.min()..=self.max()).contains(&duration)
    }

    /// Draws a uniformly distributed duration from the range.
    ///
    /// An inverted range collapses to its minimum; [`SimulationConfig::validate`]
    /// rejects those before a run starts.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max_ms <= self.min_ms {
            return self.min();
        }
        Duration::from_millis(rng.random_range(self.min_ms..=self.max_ms))
    }

    const fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.min_ms > self.max_ms {
            return Err(ConfigError::InvertedRange {
                name,
                min_ms: self.min_ms,
                max_ms: self.max_ms,
            });
        }
        Ok(())
    }
}

/// Fixed parameters of one simulation run.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationConfig {
    /// Number of philosophers, which is also the number of forks.
    pub workers: usize,
    /// How long the run lasts before workers stop starting new cycles.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "runDurationMs")]
    pub run_duration: Duration,
    /// Fixed length of every think step.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "thinkDurationMs")]
    pub think_duration: Duration,
    /// Range each eat step is drawn from.
    #[serde(rename = "eatDurationMs")]
    pub eat_duration: DurationRange,
    /// Range each probe-and-backoff retry delay is drawn from.
    #[serde(rename = "backoffMs")]
    pub backoff: DurationRange,
    /// Base seed for the per-worker random streams. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            workers: 4,
            run_duration: Duration::from_millis(60_000),
            think_duration: Duration::from_millis(10),
            eat_duration: DurationRange::from_millis(10, 40),
            backoff: DurationRange::from_millis(50, 100),
            seed: None,
        }
    }

    pub const fn workers(&mut self, workers: usize) -> &mut Self {
        self.workers = workers;
        self
    }

    pub const fn run_duration(&mut self, run_duration: Duration) -> &mut Self {
        self.run_duration = run_duration;
        self
    }

    pub const fn think_duration(&mut self, think_duration: Duration) -> &mut Self {
        self.think_duration = think_duration;
        self
    }

    pub const fn eat_duration(&mut self, eat_duration: DurationRange) -> &mut Self {
        self.eat_duration = eat_duration;
        self
    }

    pub const fn backoff(&mut self, backoff: DurationRange) -> &mut Self {
        self.backoff = backoff;
        self
    }

    pub const fn seed(&mut self, seed: Option<u64>) -> &mut Self {
        self.seed = seed;
        self
    }

    /// # Errors
    ///
    /// * If fewer than [`MIN_WORKERS`] workers are configured
    /// * If the run duration is zero
    /// * If the eat or backoff range has its minimum above its maximum
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.workers < MIN_WORKERS {
            return Err(ConfigError::TooFewWorkers(self.workers));
        }
        if self.run_duration.is_zero() {
            return Err(ConfigError::ZeroRunDuration);
        }
        if let Err(e) = self.eat_duration.validate("eat duration") {
            return Err(e);
        }
        self.backoff.validate("backoff")
    }

    /// Seed for one worker's private random stream.
    ///
    /// Workers get independent, reproducible streams derived from the base seed so
    /// no generator is shared between threads.
    #[must_use]
    pub const fn worker_seed(&self, worker: WorkerId) -> Option<u64> {
        match self.seed {
            Some(seed) => Some(seed ^ (worker.0 as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            None => None,
        }
    }
}
