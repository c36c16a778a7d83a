//! End-of-run aggregation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::{
    Variant, WorkerId,
    sink::EventLog,
    timing::{StateDurations, WorkerTimes},
};

/// Everything a finished run produced. Only built after every worker has been
/// joined.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub variant: Variant,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "runDurationMs")]
    pub run_duration: Duration,
    /// Timing of each worker that left the table normally or through an
    /// interrupt, in worker id order.
    pub workers: Vec<WorkerTimes>,
    /// Workers whose thread panicked. They are left out of the averages.
    pub failed: Vec<WorkerId>,
}

impl RunReport {
    #[must_use]
    pub fn new(
        variant: Variant,
        run_duration: Duration,
        mut workers: Vec<WorkerTimes>,
        mut failed: Vec<WorkerId>,
    ) -> Self {
        workers.sort_by_key(|w| w.worker);
        failed.sort_unstable();
        Self {
            variant,
            run_duration,
            workers,
            failed,
        }
    }

    /// Mean time per state over the workers that reported.
    #[must_use]
    pub fn averages(&self) -> StateDurations {
        let Ok(count) = u32::try_from(self.workers.len()) else {
            return StateDurations::default();
        };
        if count == 0 {
            return StateDurations::default();
        }

        let sum = self
            .workers
            .iter()
            .map(|w| w.durations)
            .fold(StateDurations::default(), |acc, d| acc + d);

        StateDurations {
            thinking: sum.thinking / count,
            hungry: sum.hungry / count,
            eating: sum.eating / count,
        }
    }

    #[must_use]
    pub fn summary_lines(&self) -> Vec<String> {
        let averages = self.averages();
        vec![
            format!(
                "Average time spent hungry: {}ms",
                averages.hungry.as_millis()
            ),
            format!(
                "Average time spent eating: {}ms",
                averages.eating.as_millis()
            ),
            format!(
                "Average time spent thinking: {}ms",
                averages.thinking.as_millis()
            ),
        ]
    }

    pub fn write_summary(&self, events: &EventLog) {
        for line in self.summary_lines() {
            log::info!("{}: {line}", self.variant);
            events.line(&line);
        }
    }

    #[must_use]
    pub fn total_meals(&self) -> u64 {
        self.workers.iter().map(|w| w.meals).sum()
    }

    pub fn interrupted(&self) -> impl Iterator<Item = &WorkerTimes> {
        self.workers.iter().filter(|w| w.interrupted)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::timing::Tally;

    fn times(worker: usize, thinking: u64, eating: u64, meals: u64) -> WorkerTimes {
        Tally {
            thinking: Duration::from_millis(thinking),
            eating: Duration::from_millis(eating),
            meals,
            ..Tally::default()
        }
        .into_residual(WorkerId(worker), Duration::from_millis(1_000), Duration::ZERO)
    }

    #[test_log::test]
    fn averages_over_reporting_workers() {
        let report = RunReport::new(
            Variant::ProbeAndBackoff,
            Duration::from_millis(1_000),
            vec![times(2, 100, 300, 3), times(0, 200, 500, 5)],
            vec![WorkerId(1)],
        );

        assert_eq!(
            report.averages(),
            StateDurations {
                thinking: Duration::from_millis(150),
                hungry: Duration::from_millis(450),
                eating: Duration::from_millis(400),
            }
        );
        assert_eq!(report.workers[0].worker, WorkerId(0));
        assert_eq!(report.total_meals(), 8);
    }

    #[test_log::test]
    fn summary_lines_use_the_log_file_wording() {
        let report = RunReport::new(
            Variant::StateVector,
            Duration::from_millis(1_000),
            vec![times(0, 100, 400, 1)],
            vec![],
        );

        assert_eq!(
            report.summary_lines(),
            vec![
                "Average time spent hungry: 500ms".to_string(),
                "Average time spent eating: 400ms".to_string(),
                "Average time spent thinking: 100ms".to_string(),
            ]
        );
    }

    #[test_log::test]
    fn empty_report_averages_to_zero() {
        let report = RunReport::new(
            Variant::StateVector,
            Duration::from_millis(10),
            vec![],
            vec![WorkerId(0), WorkerId(1)],
        );

        assert_eq!(report.averages(), StateDurations::default());
        assert_eq!(report.interrupted().count(), 0);
    }

    #[test_log::test]
    fn serializes_for_machine_readable_output() {
        let report = RunReport::new(
            Variant::ProbeAndBackoff,
            Duration::from_millis(1_000),
            vec![times(0, 100, 400, 1)],
            vec![],
        );

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["variant"], "probe-and-backoff");
        assert_eq!(value["runDurationMs"], 1_000);
        assert_eq!(value["workers"][0]["eating"], 400);
    }
}
