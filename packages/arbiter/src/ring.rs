//! Ring topology shared by both arbiters.
//!
//! Fork `i` sits between worker `i` and worker `(i + 1) % R`, so worker `i` eats
//! with forks `i` (its left fork) and `(i + 1) % R` (its right fork), and its
//! neighbours are `(i + R - 1) % R` and `(i + 1) % R`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one worker ("philosopher") in the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub usize);

impl WorkerId {
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one fork in the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub usize);

impl ResourceId {
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A ring of `size` workers and `size` forks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ring {
    size: usize,
}

impl Ring {
    /// # Panics
    ///
    /// * If `size` is zero
    #[must_use]
    pub const fn new(size: usize) -> Self {
        assert!(size > 0, "a ring needs at least one seat");
        Self { size }
    }

    #[must_use]
    pub const fn size(self) -> usize {
        self.size
    }

    pub fn workers(self) -> impl Iterator<Item = WorkerId> {
        (0..self.size).map(WorkerId)
    }

    #[must_use]
    pub const fn left_neighbor(self, worker: WorkerId) -> WorkerId {
        WorkerId((worker.0 + self.size - 1) % self.size)
    }

    #[must_use]
    pub const fn right_neighbor(self, worker: WorkerId) -> WorkerId {
        WorkerId((worker.0 + 1) % self.size)
    }

    /// The fork a worker reaches for first.
    #[must_use]
    pub const fn left_fork(self, worker: WorkerId) -> ResourceId {
        ResourceId(worker.0 % self.size)
    }

    /// The fork a worker reaches for second.
    #[must_use]
    pub const fn right_fork(self, worker: WorkerId) -> ResourceId {
        ResourceId((worker.0 + 1) % self.size)
    }

    /// Whether two distinct workers share a fork.
    #[must_use]
    pub const fn are_adjacent(self, a: WorkerId, b: WorkerId) -> bool {
        a.0 != b.0 && (self.left_neighbor(a).0 == b.0 || self.right_neighbor(a).0 == b.0)
    }
}
