//! State-vector arbitration.
//!
//! Workers never touch forks directly. A hungry worker records its intent in the
//! shared [`StateTable`], runs the admission test on itself and waits on its own
//! admission gate; a worker that finishes eating re-runs the test for both of its
//! neighbors. Hungry time is measured as the wait on the gate.

use std::time::Instant;

use crate::{
    Variant,
    config::SimulationConfig,
    interrupt::Interrupted,
    ring::Ring,
    simulation::{Arbiter, Philosopher},
    sink::Event,
    table::StateTable,
    timing::{Tally, WorkerTimes},
};

#[derive(Debug)]
pub struct StateVectorArbiter {
    config: SimulationConfig,
    table: StateTable,
}

impl StateVectorArbiter {
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            table: StateTable::new(Ring::new(config.workers)),
            config,
        }
    }

    #[must_use]
    pub const fn table(&self) -> &StateTable {
        &self.table
    }

    fn cycle(&self, philosopher: &mut Philosopher, tally: &mut Tally) -> Result<(), Interrupted> {
        let id = philosopher.id();
        let ring = self.table.ring();
        let clock = *philosopher.clock();

        while !clock.is_expired() {
            philosopher.emit(&Event::Thinking);
            philosopher.pause(self.config.think_duration, &mut tally.thinking)?;
            philosopher.emit(&Event::FinishedThinking);

            let hungry_since = Instant::now();
            let grant = self.table.take_forks(id, philosopher.pacer());
            tally.hungry += hungry_since.elapsed();
            let grant = grant?;

            philosopher.emit(&Event::AcquiredForks(
                ring.left_fork(id),
                ring.right_fork(id),
            ));
            let duration = philosopher.sample(&self.config.eat_duration);
            philosopher.emit(&Event::Eating(duration));
            philosopher.pause(duration, &mut tally.eating)?;
            philosopher.emit(&Event::FinishedEating);

            drop(grant);
            tally.meals += 1;
        }

        Ok(())
    }
}

impl Arbiter for StateVectorArbiter {
    fn variant(&self) -> Variant {
        Variant::StateVector
    }

    fn dine(&self, philosopher: &mut Philosopher) -> WorkerTimes {
        let started = Instant::now();
        let mut tally = Tally::default();

        let result = self.cycle(philosopher, &mut tally);
        if let Err(e) = &result {
            log::warn!("{e}");
            philosopher.emit(&Event::Interrupted);
        }

        tally
            .into_measured(philosopher.id(), started.elapsed())
            .interrupted(result.is_err())
    }
}
