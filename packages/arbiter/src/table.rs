//! The shared state vector and its admission test.
//!
//! All reads and writes of the vector happen under one mutex. The
//! `HUNGRY -> EATING` transition only ever happens inside the admission test,
//! which runs with that mutex held and releases the worker's private
//! [`AdmissionGate`]. The hungry worker waits on its gate outside the mutex.

use std::sync::{Mutex, MutexGuard, PoisonError};

use flume::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};

use crate::{
    WorkerId,
    interrupt::{Interrupted, Pacer},
    ring::Ring,
};

/// Logical state of one worker in the shared vector.
///
/// A worker that just finished eating goes straight back to `Thinking`; there is
/// no separate "done eating" state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PhilosopherState {
    Thinking,
    Hungry,
    Eating,
}

/// Single-permit signal a hungry worker blocks on until it is granted.
#[derive(Debug)]
pub struct AdmissionGate {
    worker: WorkerId,
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl AdmissionGate {
    fn new(worker: WorkerId) -> Self {
        let (tx, rx) = flume::bounded(1);
        Self { worker, tx, rx }
    }

    fn release(&self) {
        match self.tx.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => {
                log::error!(
                    "admission gate {}: granted twice in one hunger episode",
                    self.worker
                );
            }
            Err(TrySendError::Disconnected(())) => {
                log::error!("admission gate {}: receiver is gone", self.worker);
            }
        }
    }

    /// Consumes an outstanding permit, returning whether there was one.
    fn drain(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    #[must_use]
    pub const fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Number of permits released and not yet consumed. Never more than one.
    #[must_use]
    pub fn permits(&self) -> usize {
        self.rx.len()
    }
}

/// The shared state vector together with one admission gate per worker.
#[derive(Debug)]
pub struct StateTable {
    ring: Ring,
    states: Mutex<Vec<PhilosopherState>>,
    gates: Box<[AdmissionGate]>,
}

impl StateTable {
    /// Creates a table with every worker thinking.
    #[must_use]
    pub fn new(ring: Ring) -> Self {
        Self::from_states(vec![PhilosopherState::Thinking; ring.size()])
    }

    /// Creates a table from an explicit state vector.
    ///
    /// # Panics
    ///
    /// * If `states` is empty
    #[must_use]
    pub fn from_states(states: Vec<PhilosopherState>) -> Self {
        let ring = Ring::new(states.len());
        Self {
            ring,
            gates: ring.workers().map(AdmissionGate::new).collect(),
            states: Mutex::new(states),
        }
    }

    #[must_use]
    pub const fn ring(&self) -> Ring {
        self.ring
    }

    /// # Panics
    ///
    /// * If `worker` is not seated at this table
    #[must_use]
    pub fn gate(&self, worker: WorkerId) -> &AdmissionGate {
        &self.gates[worker.as_usize()]
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<PhilosopherState> {
        self.lock().clone()
    }

    /// # Panics
    ///
    /// * If `worker` is not seated at this table
    #[must_use]
    pub fn state(&self, worker: WorkerId) -> PhilosopherState {
        self.lock()[worker.as_usize()]
    }

    /// Runs the admission test for `worker`. Returns whether it was granted.
    ///
    /// # Panics
    ///
    /// * If `worker` is not seated at this table
    pub fn test(&self, worker: WorkerId) -> bool {
        let mut states = self.lock();
        self.admit(&mut states, worker)
    }

    /// Two adjacent workers that are both eating, if any.
    #[must_use]
    pub fn adjacent_eaters(&self) -> Option<(WorkerId, WorkerId)> {
        find_adjacent_eaters(self.ring, &self.lock())
    }

    /// Marks `worker` hungry and blocks until it is granted the eating state.
    ///
    /// The returned [`Grant`] puts the forks back when dropped.
    ///
    /// # Errors
    ///
    /// * If the worker is interrupted while waiting on its admission gate. Its
    ///   entry is rolled back to `Thinking` before this returns, and a grant that
    ///   raced with the interrupt is handed on to its neighbors.
    ///
    /// # Panics
    ///
    /// * If `worker` is not seated at this table
    pub fn take_forks<'a>(
        &'a self,
        worker: WorkerId,
        pacer: &Pacer,
    ) -> Result<Grant<'a>, Interrupted> {
        {
            let mut states = self.lock();
            states[worker.as_usize()] = PhilosopherState::Hungry;
            self.admit(&mut states, worker);
        }

        if let Err(e) = pacer.wait_for(self.gate(worker).receiver()) {
            self.withdraw(worker);
            return Err(e);
        }

        Ok(Grant {
            table: self,
            worker,
        })
    }

    /// Sets `worker` back to thinking and offers the freed forks to both
    /// neighbors.
    ///
    /// # Panics
    ///
    /// * If `worker` is not seated at this table
    pub fn put_forks(&self, worker: WorkerId) {
        let mut states = self.lock();
        states[worker.as_usize()] = PhilosopherState::Thinking;
        self.admit(&mut states, self.ring.left_neighbor(worker));
        self.admit(&mut states, self.ring.right_neighbor(worker));
    }

    fn withdraw(&self, worker: WorkerId) {
        let mut states = self.lock();
        match states[worker.as_usize()] {
            PhilosopherState::Hungry => {
                log::debug!("philosopher {worker}: withdrawn while hungry");
                states[worker.as_usize()] = PhilosopherState::Thinking;
            }
            PhilosopherState::Eating => {
                log::debug!("philosopher {worker}: withdrawn after being granted");
                states[worker.as_usize()] = PhilosopherState::Thinking;
                self.gate(worker).drain();
                self.admit(&mut states, self.ring.left_neighbor(worker));
                self.admit(&mut states, self.ring.right_neighbor(worker));
            }
            PhilosopherState::Thinking => {}
        }
    }

    /// The admission test. Must be called with the state vector locked; this is
    /// the only place a worker becomes `Eating`.
    fn admit(&self, states: &mut [PhilosopherState], worker: WorkerId) -> bool {
        let left = self.ring.left_neighbor(worker);
        let right = self.ring.right_neighbor(worker);

        if states[worker.as_usize()] != PhilosopherState::Hungry
            || states[left.as_usize()] == PhilosopherState::Eating
            || states[right.as_usize()] == PhilosopherState::Eating
        {
            return false;
        }

        states[worker.as_usize()] = PhilosopherState::Eating;
        debug_assert_eq!(find_adjacent_eaters(self.ring, states), None);
        log::debug!("philosopher {worker}: admitted to eat");
        self.gate(worker).release();
        true
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PhilosopherState>> {
        // Every write under this lock is a single assignment, so a vector left
        // behind by a panicking thread is still consistent.
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn find_adjacent_eaters(ring: Ring, states: &[PhilosopherState]) -> Option<(WorkerId, WorkerId)> {
    ring.workers().find_map(|worker| {
        let right = ring.right_neighbor(worker);
        (worker != right
            && states[worker.as_usize()] == PhilosopherState::Eating
            && states[right.as_usize()] == PhilosopherState::Eating)
            .then_some((worker, right))
    })
}

/// Permission to eat. Dropping it puts the forks back.
#[derive(Debug)]
pub struct Grant<'a> {
    table: &'a StateTable,
    worker: WorkerId,
}

impl Grant<'_> {
    #[must_use]
    pub const fn worker(&self) -> WorkerId {
        self.worker
    }
}

impl Drop for Grant<'_> {
    fn drop(&mut self) {
        self.table.put_forks(self.worker);
    }
}
