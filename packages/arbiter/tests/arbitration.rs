use std::{
    collections::BTreeMap,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use dining_arbiter::{
    Variant, WorkerId,
    config::{DurationRange, SimulationConfig},
    probe::ProbeArbiter,
    report::RunReport,
    ring::Ring,
    simulation::Simulation,
    sink::{Event, EventRecord, MemorySink},
    state_vector::StateVectorArbiter,
    table::PhilosopherState,
    timing::HungryAccounting,
};
use pretty_assertions::assert_eq;

fn config(workers: usize, run_ms: u64, seed: u64) -> SimulationConfig {
    let mut config = SimulationConfig::new();
    config
        .workers(workers)
        .run_duration(Duration::from_millis(run_ms))
        .seed(Some(seed));
    config
}

fn run(config: SimulationConfig, variant: Variant) -> (RunReport, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let simulation = Simulation::new(config, sink.clone()).unwrap();
    let report = simulation.run(variant).unwrap();
    (report, sink)
}

/// `[eat-start, eat-end)` intervals per worker, taken from the event log.
fn eating_intervals(events: &[EventRecord]) -> BTreeMap<WorkerId, Vec<(Duration, Duration)>> {
    let mut open = BTreeMap::new();
    let mut intervals: BTreeMap<WorkerId, Vec<_>> = BTreeMap::new();

    for event in events {
        if event.message.starts_with(Event::EATING_PREFIX) {
            assert!(
                open.insert(event.worker, event.elapsed).is_none(),
                "philosopher {} started eating twice",
                event.worker
            );
        } else if event.message == Event::FINISHED_EATING {
            let start = open
                .remove(&event.worker)
                .expect("finished eating without starting");
            intervals
                .entry(event.worker)
                .or_default()
                .push((start, event.elapsed));
        }
    }

    intervals
}

fn assert_adjacent_eaters_never_overlap(ring: Ring, events: &[EventRecord]) {
    let intervals = eating_intervals(events);
    assert!(!intervals.is_empty(), "nobody ate");

    for worker in ring.workers() {
        let neighbor = ring.right_neighbor(worker);
        let (Some(mine), Some(theirs)) = (intervals.get(&worker), intervals.get(&neighbor)) else {
            continue;
        };
        for &(a_start, a_end) in mine {
            for &(b_start, b_end) in theirs {
                assert!(
                    a_end <= b_start || b_end <= a_start,
                    "philosophers {worker} and {neighbor} ate at the same time: \
                     {a_start:?}..{a_end:?} and {b_start:?}..{b_end:?}"
                );
            }
        }
    }
}

/// Scheduling slack allowed between a measured total and the worker's lifetime:
/// a fixed allowance plus a little per think/eat cycle.
fn measured_slack(meals: u64) -> Duration {
    Duration::from_millis(10) + Duration::from_millis(2) * u32::try_from(meals + 1).unwrap()
}

fn assert_conserved(report: &RunReport, config: &SimulationConfig) {
    let deadline_tolerance =
        config.think_duration + config.eat_duration.max() * 3 + config.run_duration / 10;

    for worker in &report.workers {
        let total = worker.total();

        match worker.accounting {
            HungryAccounting::Residual => {
                assert_eq!(total, config.run_duration, "{worker}");
            }
            HungryAccounting::Measured => {
                let slack = measured_slack(worker.meals);
                assert!(
                    total <= worker.lifetime,
                    "{worker}: total {total:?} exceeds lifetime {:?}",
                    worker.lifetime
                );
                assert!(
                    worker.lifetime - total <= slack,
                    "{worker}: total {total:?} is more than {slack:?} short of lifetime {:?}",
                    worker.lifetime
                );
            }
        }

        let diff = total.abs_diff(config.run_duration);
        assert!(
            diff <= deadline_tolerance,
            "{worker}: total {total:?} is {diff:?} away from {:?}",
            config.run_duration
        );
    }
}

#[test_log::test]
fn four_philosophers_probe_and_backoff() {
    let config = config(4, 1_000, 42);
    let (report, sink) = run(config, Variant::ProbeAndBackoff);

    assert_eq!(report.workers.len(), 4);
    assert!(report.failed.is_empty());
    assert_conserved(&report, &config);
    assert_adjacent_eaters_never_overlap(Ring::new(4), &sink.events());
}

#[test_log::test]
fn four_philosophers_state_vector() {
    let config = config(4, 1_000, 42);
    let (report, sink) = run(config, Variant::StateVector);

    assert_eq!(report.workers.len(), 4);
    assert!(report.failed.is_empty());
    assert_conserved(&report, &config);
    assert_adjacent_eaters_never_overlap(Ring::new(4), &sink.events());
}

#[test_log::test]
fn hungry_accounting_differs_between_variants() {
    let config = config(4, 500, 7);

    let (probe, _) = run(config, Variant::ProbeAndBackoff);
    for worker in &probe.workers {
        assert_eq!(worker.accounting, HungryAccounting::Residual);
        assert_eq!(worker.total(), config.run_duration);
    }

    let (state_vector, _) = run(config, Variant::StateVector);
    let mut differs = false;
    for worker in &state_vector.workers {
        assert_eq!(worker.accounting, HungryAccounting::Measured);
        let residual = config
            .run_duration
            .saturating_sub(worker.durations.thinking + worker.durations.eating);
        differs |= residual != worker.durations.hungry;
    }
    assert!(differs, "measured hungry time matched the residual formula");
}

/// Retries a worker of a two-seat ring may average per meal before the pair is
/// considered livelocked.
const MAX_BACKOFFS_PER_MEAL: u64 = 4;

#[test_log::test]
fn minimal_ring_does_not_livelock() {
    let mut config = config(2, 600, 1_234);
    config
        .eat_duration(DurationRange::from_millis(5, 15))
        .backoff(DurationRange::from_millis(5, 20));

    // Every back-off sleeps at least `backoff.min()`, which caps the retries a
    // worker can fit in the run.
    let max_backoffs = config.run_duration.as_millis() / config.backoff.min().as_millis();

    let (report, sink) = run(config, Variant::ProbeAndBackoff);

    for worker in &report.workers {
        assert!(worker.meals > 0, "philosopher {} never ate", worker.worker);
        assert!(
            u128::from(worker.backoffs) <= max_backoffs,
            "philosopher {} backed off {} times in {:?}",
            worker.worker,
            worker.backoffs,
            config.run_duration
        );
        assert!(
            worker.backoffs <= MAX_BACKOFFS_PER_MEAL * (worker.meals + 1),
            "philosopher {} backed off {} times for {} meals",
            worker.worker,
            worker.backoffs,
            worker.meals
        );
    }
    assert_adjacent_eaters_never_overlap(Ring::new(2), &sink.events());
}

#[test_log::test]
fn both_variants_finish_under_contention() {
    for variant in Variant::ALL {
        let mut config = config(5, 300, 99);
        config
            .think_duration(Duration::from_millis(1))
            .eat_duration(DurationRange::from_millis(1, 5))
            .backoff(DurationRange::from_millis(1, 3));

        let (tx, rx) = flume::bounded(1);
        let runner = thread::spawn(move || {
            let (report, _) = run(config, variant);
            tx.send(report).unwrap();
        });

        let report = rx
            .recv_timeout(Duration::from_secs(10))
            .unwrap_or_else(|e| panic!("{variant} run did not finish: {e:?}"));
        runner.join().unwrap();

        assert_eq!(report.variant, variant);
        assert!(report.total_meals() > 0);
    }
}

#[test_log::test]
fn stopping_a_probe_run_releases_every_fork() {
    let mut config = config(4, 30_000, 8);
    config.backoff(DurationRange::from_millis(5, 10));
    let arbiter = ProbeArbiter::new(config);
    let simulation = Simulation::new(config, Arc::new(MemorySink::new())).unwrap();
    let stop = simulation.stop_handle();

    let started = Instant::now();
    let report = thread::scope(|scope| {
        let running = scope.spawn(|| simulation.run_with(&arbiter).unwrap());
        thread::sleep(Duration::from_millis(200));
        stop.stop();
        running.join().unwrap()
    });

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.interrupted().count(), 4);
    assert!(!arbiter.any_held());
    for worker in &report.workers {
        assert!(worker.lifetime < Duration::from_secs(10));
        assert!(worker.total() <= worker.lifetime, "{worker}");
    }
}

#[test_log::test]
fn stopping_a_state_vector_run_leaves_a_valid_table() {
    let config = config(5, 30_000, 8);
    let arbiter = StateVectorArbiter::new(config);
    let sink = Arc::new(MemorySink::new());
    let simulation = Simulation::new(config, sink.clone()).unwrap();
    let stop = simulation.stop_handle();

    let report = thread::scope(|scope| {
        let running = scope.spawn(|| simulation.run_with(&arbiter).unwrap());
        thread::sleep(Duration::from_millis(200));
        stop.stop();
        running.join().unwrap()
    });

    assert_eq!(report.interrupted().count(), 5);
    assert_eq!(arbiter.table().adjacent_eaters(), None);
    assert_eq!(arbiter.table().snapshot(), vec![PhilosopherState::Thinking; 5]);

    let interrupted = sink
        .events()
        .iter()
        .filter(|e| e.message == Event::Interrupted.to_string())
        .count();
    assert_eq!(interrupted, 5);
    assert!(
        sink.lines()
            .last()
            .is_some_and(|line| line.starts_with("Average time spent thinking"))
    );
}
