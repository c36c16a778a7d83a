//! Exclusive resources with non-blocking, scoped acquisition.
//!
//! A [`Fork`] can only be taken through [`Fork::try_acquire`], which never blocks
//! and hands back a [`ForkGuard`] on success. Dropping the guard puts the fork
//! back, so a worker that bails out of an acquisition attempt (or unwinds from an
//! interrupt or a panic) cannot keep holding it.

use std::sync::{
    Mutex, MutexGuard, TryLockError,
    atomic::{AtomicUsize, Ordering},
};

use crate::{ResourceId, WorkerId, ring::Ring};

const NO_HOLDER: usize = usize::MAX;

/// One fork on the table.
#[derive(Debug)]
pub struct Fork {
    id: ResourceId,
    lock: Mutex<()>,
    holder: AtomicUsize,
}

/// Outcome of a non-blocking acquisition attempt.
#[derive(Debug)]
#[must_use = "dropping an acquired fork releases it immediately"]
pub enum TryAcquire<'a> {
    Acquired(ForkGuard<'a>),
    Unavailable,
}

impl TryAcquire<'_> {
    #[must_use]
    pub const fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(..))
    }
}

impl Fork {
    #[must_use]
    pub const fn new(id: ResourceId) -> Self {
        Self {
            id,
            lock: Mutex::new(()),
            holder: AtomicUsize::new(NO_HOLDER),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// Takes the fork if nobody holds it.
    ///
    /// A fork whose previous holder panicked is still handed out: the fork carries
    /// no data that the panic could have left half-written.
    pub fn try_acquire(&self, worker: WorkerId) -> TryAcquire<'_> {
        let guard = match self.lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                log::trace!("fork {}: unavailable to philosopher {worker}", self.id);
                return TryAcquire::Unavailable;
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                log::warn!(
                    "fork {}: previous holder panicked, handing it to philosopher {worker}",
                    self.id
                );
                self.lock.clear_poison();
                poisoned.into_inner()
            }
        };

        let previous = self.holder.swap(worker.as_usize(), Ordering::SeqCst);
        debug_assert_eq!(
            previous, NO_HOLDER,
            "fork {} handed to {worker} while held by {previous}",
            self.id
        );
        log::trace!("fork {}: acquired by philosopher {worker}", self.id);

        TryAcquire::Acquired(ForkGuard {
            fork: self,
            worker,
            _guard: guard,
        })
    }

    /// The worker currently holding the fork, if any.
    #[must_use]
    pub fn holder(&self) -> Option<WorkerId> {
        match self.holder.load(Ordering::SeqCst) {
            NO_HOLDER => None,
            id => Some(WorkerId(id)),
        }
    }
}

/// Proof that a worker holds a fork. The fork is released on drop.
#[derive(Debug)]
pub struct ForkGuard<'a> {
    fork: &'a Fork,
    worker: WorkerId,
    _guard: MutexGuard<'a, ()>,
}

impl ForkGuard<'_> {
    #[must_use]
    pub const fn id(&self) -> ResourceId {
        self.fork.id
    }

    #[must_use]
    pub const fn worker(&self) -> WorkerId {
        self.worker
    }
}

impl Drop for ForkGuard<'_> {
    fn drop(&mut self) {
        // Cleared before the lock field is dropped, so the next holder never
        // observes a stale id.
        self.fork.holder.store(NO_HOLDER, Ordering::SeqCst);
        log::trace!(
            "fork {}: released by philosopher {}",
            self.fork.id,
            self.worker
        );
    }
}

/// All forks of a ring.
#[derive(Debug)]
pub struct Forks {
    ring: Ring,
    forks: Box<[Fork]>,
}

impl Forks {
    #[must_use]
    pub fn new(ring: Ring) -> Self {
        Self {
            ring,
            forks: (0..ring.size()).map(|id| Fork::new(ResourceId(id))).collect(),
        }
    }

    #[must_use]
    pub const fn ring(&self) -> Ring {
        self.ring
    }

    #[must_use]
    pub fn get(&self, id: ResourceId) -> &Fork {
        &self.forks[id.as_usize() % self.forks.len()]
    }

    /// The two forks a worker needs, in acquisition order.
    #[must_use]
    pub fn place_setting(&self, worker: WorkerId) -> (&Fork, &Fork) {
        (
            self.get(self.ring.left_fork(worker)),
            self.get(self.ring.right_fork(worker)),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fork> {
        self.forks.iter()
    }
}
