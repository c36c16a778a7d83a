//! Per-worker time accounting.
//!
//! Each worker owns a [`Tally`] while it runs and turns it into an immutable
//! [`WorkerTimes`] when it leaves the table. The two arbiters derive the hungry
//! time differently and the difference is kept on purpose:
//!
//! * [`HungryAccounting::Residual`]: whatever part of the run was neither spent
//!   thinking nor eating, computed once at the end.
//! * [`HungryAccounting::Measured`]: the summed wall-clock gaps between becoming
//!   hungry and being granted the forks.

use std::{fmt, ops::Add, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::WorkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HungryAccounting {
    Residual,
    Measured,
}

/// Time spent in each of the three states.
#[serde_as]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDurations {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub thinking: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub hungry: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub eating: Duration,
}

impl StateDurations {
    #[must_use]
    pub fn total(&self) -> Duration {
        self.thinking + self.hungry + self.eating
    }
}

impl Add for StateDurations {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            thinking: self.thinking + rhs.thinking,
            hungry: self.hungry + rhs.hungry,
            eating: self.eating + rhs.eating,
        }
    }
}

/// Running counters of one worker, mutated only by that worker's thread.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub thinking: Duration,
    pub hungry: Duration,
    pub eating: Duration,
    pub meals: u64,
    pub backoffs: u64,
}

impl Tally {
    /// Closes the tally with the residual formula:
    /// `hungry = total - thinking - eating`.
    #[must_use]
    pub fn into_residual(self, worker: WorkerId, total: Duration, lifetime: Duration) -> WorkerTimes {
        WorkerTimes {
            worker,
            durations: StateDurations {
                thinking: self.thinking,
                hungry: total.saturating_sub(self.thinking + self.eating),
                eating: self.eating,
            },
            accounting: HungryAccounting::Residual,
            meals: self.meals,
            backoffs: self.backoffs,
            lifetime,
            interrupted: false,
        }
    }

    /// Closes the tally keeping the incrementally measured hungry time.
    #[must_use]
    pub const fn into_measured(self, worker: WorkerId, lifetime: Duration) -> WorkerTimes {
        WorkerTimes {
            worker,
            durations: StateDurations {
                thinking: self.thinking,
                hungry: self.hungry,
                eating: self.eating,
            },
            accounting: HungryAccounting::Measured,
            meals: self.meals,
            backoffs: self.backoffs,
            lifetime,
            interrupted: false,
        }
    }
}

/// Final, read-only timing of one worker.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerTimes {
    pub worker: WorkerId,
    #[serde(flatten)]
    pub durations: StateDurations,
    pub accounting: HungryAccounting,
    pub meals: u64,
    pub backoffs: u64,
    /// Wall-clock time between the worker starting and leaving the table.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub lifetime: Duration,
    /// Whether the worker stopped early because a suspension was interrupted.
    pub interrupted: bool,
}

impl WorkerTimes {
    #[must_use]
    pub const fn interrupted(mut self, interrupted: bool) -> Self {
        self.interrupted = interrupted;
        self
    }

    #[must_use]
    pub fn total(&self) -> Duration {
        self.durations.total()
    }
}

impl fmt::Display for WorkerTimes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Philosopher {}: hungry: {}ms, eatingTime: {}ms, thinking: {}ms",
            self.worker,
            self.durations.hungry.as_millis(),
            self.durations.eating.as_millis(),
            self.durations.thinking.as_millis(),
        )?;
        if self.interrupted {
            f.write_str(" (interrupted)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn tally() -> Tally {
        Tally {
            thinking: Duration::from_millis(300),
            hungry: Duration::from_millis(150),
            eating: Duration::from_millis(400),
            meals: 12,
            backoffs: 5,
        }
    }

    #[test_log::test]
    fn residual_accounting_fills_the_run() {
        let times = tally().into_residual(
            WorkerId(1),
            Duration::from_millis(1_000),
            Duration::from_millis(1_020),
        );

        assert_eq!(times.durations.hungry, Duration::from_millis(300));
        assert_eq!(times.total(), Duration::from_millis(1_000));
        assert_eq!(times.accounting, HungryAccounting::Residual);
    }

    #[test_log::test]
    fn measured_accounting_keeps_observed_waits() {
        let times = tally().into_measured(WorkerId(1), Duration::from_millis(1_020));

        assert_eq!(times.durations.hungry, Duration::from_millis(150));
        assert_eq!(times.total(), Duration::from_millis(850));
        assert_eq!(times.accounting, HungryAccounting::Measured);
    }

    #[test_log::test]
    fn accounting_methods_disagree_for_the_same_tally() {
        let residual = tally().into_residual(WorkerId(0), Duration::from_secs(1), Duration::ZERO);
        let measured = tally().into_measured(WorkerId(0), Duration::ZERO);

        assert_ne!(residual.durations.hungry, measured.durations.hungry);
        assert_eq!(residual.durations.thinking, measured.durations.thinking);
        assert_eq!(residual.durations.eating, measured.durations.eating);
    }

    #[test_log::test]
    fn residual_never_goes_negative() {
        let times = tally().into_residual(WorkerId(0), Duration::from_millis(500), Duration::ZERO);

        assert_eq!(times.durations.hungry, Duration::ZERO);
    }

    #[test_log::test]
    fn display_matches_the_summary_line() {
        let times = tally()
            .into_residual(WorkerId(3), Duration::from_secs(1), Duration::ZERO)
            .interrupted(true);

        assert_eq!(
            times.to_string(),
            "Philosopher 3: hungry: 300ms, eatingTime: 400ms, thinking: 300ms (interrupted)"
        );
    }

    #[test_log::test]
    fn serializes_flat_millis() {
        let value = serde_json::to_value(tally().into_measured(WorkerId(2), Duration::from_millis(9)))
            .unwrap();

        assert_eq!(value["worker"], 2);
        assert_eq!(value["hungry"], 150);
        assert_eq!(value["accounting"], "measured");
        assert_eq!(value["lifetime"], 9);
    }

    #[test_log::test]
    fn deserializes_flat_millis() {
        let times: WorkerTimes = serde_json::from_str(
            r#"{
                "worker": 1,
                "thinking": 300,
                "hungry": 150,
                "eating": 400,
                "accounting": "residual",
                "meals": 12,
                "backoffs": 5,
                "lifetime": 1020,
                "interrupted": false
            }"#,
        )
        .unwrap();

        assert_eq!(times.durations.hungry, Duration::from_millis(150));
        assert_eq!(times.total(), Duration::from_millis(850));
        assert_eq!(times.lifetime, Duration::from_millis(1_020));
        assert_eq!(times.backoffs, 5);
    }
}
