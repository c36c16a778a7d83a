//! Probe-and-backoff arbitration.
//!
//! A hungry worker probes its left fork, then its right fork, without ever
//! blocking. If the right fork is taken it puts the left one back before backing
//! off for a random interval, so no worker holds a fork while waiting for another
//! and a circular wait cannot form. There is no fairness guarantee: a worker can
//! lose the race to its neighbors any number of times in a row.
//!
//! Hungry time is the residual of the run once thinking and eating are taken out.

use std::time::Instant;

use crate::{
    Variant,
    config::SimulationConfig,
    fork::{Forks, TryAcquire},
    interrupt::Interrupted,
    ring::Ring,
    simulation::{Arbiter, Philosopher},
    sink::Event,
    timing::{Tally, WorkerTimes},
};

#[derive(Debug)]
pub struct ProbeArbiter {
    config: SimulationConfig,
    forks: Forks,
}

impl ProbeArbiter {
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            forks: Forks::new(Ring::new(config.workers)),
            config,
        }
    }

    #[must_use]
    pub const fn forks(&self) -> &Forks {
        &self.forks
    }

    fn cycle(&self, philosopher: &mut Philosopher, tally: &mut Tally) -> Result<(), Interrupted> {
        let clock = *philosopher.clock();

        while !clock.is_expired() {
            philosopher.emit(&Event::Thinking);
            philosopher.pause(self.config.think_duration, &mut tally.thinking)?;

            philosopher.emit(&Event::Hungry);
            self.eat(philosopher, tally)?;
        }

        Ok(())
    }

    /// Probes both forks until the worker has eaten once or the deadline passes.
    fn eat(&self, philosopher: &mut Philosopher, tally: &mut Tally) -> Result<(), Interrupted> {
        let id = philosopher.id();
        let (left, right) = self.forks.place_setting(id);
        let clock = *philosopher.clock();

        while !clock.is_expired() {
            let TryAcquire::Acquired(left_guard) = left.try_acquire(id) else {
                self.back_off(philosopher, tally)?;
                continue;
            };
            philosopher.emit(&Event::PickedUpFork(left.id()));

            let TryAcquire::Acquired(right_guard) = right.try_acquire(id) else {
                drop(left_guard);
                philosopher.emit(&Event::PutDownFork(left.id()));
                self.back_off(philosopher, tally)?;
                continue;
            };
            philosopher.emit(&Event::PickedUpFork(right.id()));

            let duration = philosopher.sample(&self.config.eat_duration);
            philosopher.emit(&Event::Eating(duration));
            philosopher.pause(duration, &mut tally.eating)?;
            philosopher.emit(&Event::FinishedEating);

            drop(right_guard);
            drop(left_guard);
            tally.meals += 1;
            return Ok(());
        }

        Ok(())
    }

    fn back_off(
        &self,
        philosopher: &mut Philosopher,
        tally: &mut Tally,
    ) -> Result<(), Interrupted> {
        tally.backoffs += 1;
        let delay = philosopher.sample(&self.config.backoff);
        log::trace!("philosopher {}: backing off {}ms", philosopher.id(), delay.as_millis());
        // Backoff time is hungry time, which is derived at the end of the run.
        philosopher.pacer().sleep(delay)
    }

    /// Whether any fork is still held by someone.
    #[must_use]
    pub fn any_held(&self) -> bool {
        self.forks.iter().any(|fork| fork.holder().is_some())
    }
}

impl Arbiter for ProbeArbiter {
    fn variant(&self) -> Variant {
        Variant::ProbeAndBackoff
    }

    fn dine(&self, philosopher: &mut Philosopher) -> WorkerTimes {
        let started = Instant::now();
        let mut tally = Tally::default();

        let result = self.cycle(philosopher, &mut tally);
        let lifetime = started.elapsed();

        if let Err(e) = &result {
            log::warn!("{e}");
            philosopher.emit(&Event::Interrupted);
        }

        // An interrupted worker only accounts for the time it was at the table.
        let total = if result.is_err() {
            lifetime.min(self.config.run_duration)
        } else {
            self.config.run_duration
        };

        tally
            .into_residual(philosopher.id(), total, lifetime)
            .interrupted(result.is_err())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        WorkerId,
        config::DurationRange,
        simulation::Simulation,
        sink::MemorySink,
        timing::HungryAccounting,
    };

    fn config(workers: usize, run_ms: u64) -> SimulationConfig {
        let mut config = SimulationConfig::new();
        config
            .workers(workers)
            .run_duration(Duration::from_millis(run_ms))
            .eat_duration(DurationRange::from_millis(2, 6))
            .backoff(DurationRange::from_millis(1, 4))
            .think_duration(Duration::from_millis(1))
            .seed(Some(3));
        config
    }

    #[test_log::test]
    fn residual_accounting_sums_to_the_run_duration() {
        let simulation = Simulation::new(config(4, 200), Arc::new(MemorySink::new())).unwrap();

        let report = simulation.run(Variant::ProbeAndBackoff).unwrap();

        assert_eq!(report.workers.len(), 4);
        for worker in &report.workers {
            assert_eq!(worker.accounting, HungryAccounting::Residual);
            assert_eq!(worker.total(), Duration::from_millis(200), "{worker}");
            assert!(!worker.interrupted);
        }
    }

    #[test_log::test]
    fn every_meal_is_bracketed_by_both_forks() {
        let sink = Arc::new(MemorySink::new());
        let simulation = Simulation::new(config(3, 150), sink.clone()).unwrap();

        let report = simulation.run(Variant::ProbeAndBackoff).unwrap();

        let events = sink.events();
        for worker in &report.workers {
            let WorkerId(id) = worker.worker;
            let messages: Vec<_> = events
                .iter()
                .filter(|e| e.worker == worker.worker)
                .map(|e| e.message.as_str())
                .collect();

            let meals = messages
                .windows(3)
                .filter(|w| {
                    w[0] == format!("picked up fork {id}")
                        && w[1] == format!("picked up fork {}", (id + 1) % 3)
                        && w[2].starts_with(Event::EATING_PREFIX)
                })
                .count();
            assert_eq!(u64::try_from(meals).unwrap(), worker.meals);
        }
    }

    #[test_log::test]
    fn forks_are_all_free_after_a_run() {
        let arbiter = ProbeArbiter::new(config(4, 100));
        let simulation = Simulation::new(config(4, 100), Arc::new(MemorySink::new())).unwrap();

        simulation.run_with(&arbiter).unwrap();

        assert!(!arbiter.any_held());
    }
}
