//! Runs one arbiter over a ring of worker threads.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use rand::{SeedableRng as _, rngs::SmallRng};
use thiserror::Error;

use crate::{
    Variant, WorkerId,
    clock::RunClock,
    config::{ConfigError, DurationRange, SimulationConfig},
    interrupt::{InterruptHandle, Interrupted, Pacer},
    probe::ProbeArbiter,
    report::RunReport,
    ring::Ring,
    sink::{Event, EventLog, LogSink},
    state_vector::StateVectorArbiter,
    timing::WorkerTimes,
};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

/// One worker's private context: identity, interrupt channel, random stream and
/// event log.
#[derive(Debug)]
pub struct Philosopher {
    id: WorkerId,
    pacer: Pacer,
    rng: SmallRng,
    events: EventLog,
}

impl Philosopher {
    #[must_use]
    pub fn new(pacer: Pacer, rng: SmallRng, events: EventLog) -> Self {
        Self {
            id: pacer.worker(),
            pacer,
            rng,
            events,
        }
    }

    #[must_use]
    pub const fn id(&self) -> WorkerId {
        self.id
    }

    #[must_use]
    pub const fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    #[must_use]
    pub const fn clock(&self) -> &RunClock {
        self.events.clock()
    }

    pub fn emit(&self, event: &Event) {
        self.events.emit(self.id, event);
    }

    pub fn sample(&mut self, range: &DurationRange) -> Duration {
        range.sample(&mut self.rng)
    }

    /// Sleeps for `duration` and adds it to `counter`.
    ///
    /// An interrupted sleep only adds the time actually slept.
    ///
    /// # Errors
    ///
    /// * If the sleep is interrupted
    pub fn pause(&self, duration: Duration, counter: &mut Duration) -> Result<(), Interrupted> {
        let started = Instant::now();
        match self.pacer.sleep(duration) {
            Ok(()) => {
                *counter += duration;
                Ok(())
            }
            Err(e) => {
                *counter += started.elapsed().min(duration);
                Err(e)
            }
        }
    }
}

/// An arbitration protocol driving workers around the table.
pub trait Arbiter: Send + Sync {
    fn variant(&self) -> Variant;

    /// Runs one worker until the deadline passes or it is interrupted, and
    /// returns its final timing.
    fn dine(&self, philosopher: &mut Philosopher) -> WorkerTimes;
}

/// Interrupts whichever run is in progress, and every run started afterwards.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
    current: Arc<Mutex<Option<InterruptHandle>>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Some(handle) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            handle.interrupt_all();
        }
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn install(&self, handle: Option<InterruptHandle>) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *current = handle;
        if self.is_stopped()
            && let Some(handle) = current.as_ref()
        {
            handle.interrupt_all();
        }
    }
}

#[derive(Clone)]
pub struct Simulation {
    config: SimulationConfig,
    sink: Arc<dyn LogSink>,
    stop: StopHandle,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("stop", &self.stop)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// # Errors
    ///
    /// * If the config is invalid
    pub fn new(config: SimulationConfig, sink: Arc<dyn LogSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            sink,
            stop: StopHandle::default(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// A handle that interrupts every worker of the current and later runs.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Runs the given variant to completion and writes the averages to the sink.
    ///
    /// # Errors
    ///
    /// * If a worker thread fails to spawn
    pub fn run(&self, variant: Variant) -> Result<RunReport, RunError> {
        let arbiter: Box<dyn Arbiter> = match variant {
            Variant::ProbeAndBackoff => Box::new(ProbeArbiter::new(self.config)),
            Variant::StateVector => Box::new(StateVectorArbiter::new(self.config)),
        };
        self.run_with(arbiter.as_ref())
    }

    /// Runs an arbiter to completion and writes the averages to the sink.
    ///
    /// Workers that panic are left out of the averages and listed in
    /// [`RunReport::failed`].
    ///
    /// # Errors
    ///
    /// * If a worker thread fails to spawn. Workers that already started are
    ///   interrupted and joined first.
    pub fn run_with(&self, arbiter: &dyn Arbiter) -> Result<RunReport, RunError> {
        let variant = arbiter.variant();
        let ring = Ring::new(self.config.workers);
        let (interrupts, pacers) = InterruptHandle::new(ring.size());
        let clock = RunClock::start(self.config.run_duration);
        let events = EventLog::new(self.sink.clone(), clock);

        log::info!(
            "Starting {variant} run: philosophers={} duration={}ms seed={:?}",
            ring.size(),
            self.config.run_duration.as_millis(),
            self.config.seed,
        );
        events.line(&format!(
            "Variant: {variant}, philosophers: {}, duration: {} ms",
            ring.size(),
            self.config.run_duration.as_millis()
        ));

        self.stop.install(Some(interrupts.clone()));

        let outcome = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(ring.size());

            for pacer in pacers {
                let id = pacer.worker();
                let rng = self
                    .config
                    .worker_seed(id)
                    .map_or_else(SmallRng::from_os_rng, SmallRng::seed_from_u64);
                let mut philosopher = Philosopher::new(pacer, rng, events.clone());

                let spawned = thread::Builder::new()
                    .name(format!("philosopher-{id}"))
                    .spawn_scoped(scope, move || arbiter.dine(&mut philosopher));

                match spawned {
                    Ok(handle) => handles.push((id, handle)),
                    Err(e) => {
                        log::error!("Failed to spawn philosopher {id}: {e:?}");
                        interrupts.interrupt_all();
                        for (id, handle) in handles {
                            if handle.join().is_err() {
                                log::error!("Philosopher {id} panicked");
                            }
                        }
                        return Err(e);
                    }
                }
            }

            let mut workers = Vec::with_capacity(handles.len());
            let mut failed = vec![];

            for (id, handle) in handles {
                match handle.join() {
                    Ok(times) => {
                        log::debug!("philosopher {id} left the table: {times}");
                        workers.push(times);
                    }
                    Err(e) => {
                        log::error!("Philosopher {id} panicked: {e:?}");
                        failed.push(id);
                    }
                }
            }

            Ok((workers, failed))
        });

        self.stop.install(None);

        let (workers, failed) = outcome?;
        let report = RunReport::new(variant, self.config.run_duration, workers, failed);
        report.write_summary(&events);

        log::info!(
            "Finished {variant} run in {}ms: meals={} interrupted={} failed={}",
            clock.elapsed().as_millis(),
            report.total_meals(),
            report.interrupted().count(),
            report.failed.len(),
        );

        Ok(report)
    }
}
