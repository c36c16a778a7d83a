//! Interruptible suspension points.
//!
//! Every sleep and gate wait a worker performs goes through its [`Pacer`], which
//! also listens on a private interrupt channel. An [`InterruptHandle`] owns the
//! sending halves and can stop one worker or the whole table. An interrupt is
//! fatal to that worker's loop: the suspension returns [`Interrupted`] and the
//! worker unwinds through its scoped fork guards or admission grant.

use std::{sync::Arc, time::Duration};

use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;

use crate::WorkerId;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Philosopher {0} was interrupted")]
pub struct Interrupted(pub WorkerId);

/// Sends interrupts to the workers of one run.
///
/// Cheap to clone; every clone targets the same workers.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    senders: Arc<[Sender<()>]>,
}

impl InterruptHandle {
    /// Creates one interrupt channel per worker and returns the handle together
    /// with the per-worker pacers, indexed by worker id.
    #[must_use]
    pub fn new(workers: usize) -> (Self, Vec<Pacer>) {
        let (senders, pacers): (Vec<_>, Vec<_>) = (0..workers)
            .map(|id| {
                let (tx, rx) = flume::bounded(1);
                (
                    tx,
                    Pacer {
                        worker: WorkerId(id),
                        interrupts: rx,
                    },
                )
            })
            .unzip();

        (
            Self {
                senders: senders.into(),
            },
            pacers,
        )
    }

    /// Interrupts one worker. Returns `false` if the worker id is unknown or the
    /// worker has already left the table.
    pub fn interrupt(&self, worker: WorkerId) -> bool {
        let Some(sender) = self.senders.get(worker.as_usize()) else {
            log::warn!("interrupt: unknown philosopher {worker}");
            return false;
        };

        match sender.try_send(()) {
            // A pending interrupt is as good as a new one.
            Ok(()) | Err(TrySendError::Full(())) => {
                log::debug!("interrupt: philosopher {worker} signalled");
                true
            }
            Err(TrySendError::Disconnected(())) => {
                log::debug!("interrupt: philosopher {worker} already left");
                false
            }
        }
    }

    pub fn interrupt_all(&self) {
        log::info!("Interrupting all {} philosophers", self.senders.len());
        for id in 0..self.senders.len() {
            self.interrupt(WorkerId(id));
        }
    }
}

/// A worker's view of its interrupt channel.
#[derive(Debug)]
pub struct Pacer {
    worker: WorkerId,
    interrupts: Receiver<()>,
}

impl Pacer {
    #[must_use]
    pub const fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Sleeps for `duration` unless interrupted first.
    ///
    /// A disconnected interrupt channel means the run that owned it is gone, which
    /// is treated as an interrupt as well.
    ///
    /// # Errors
    ///
    /// * If the worker is interrupted before the duration elapses
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        match self.interrupts.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Err(Interrupted(self.worker)),
        }
    }

    /// Blocks until a permit arrives on `gate` or the worker is interrupted.
    ///
    /// A permit that is already waiting wins over a pending interrupt.
    ///
    /// # Errors
    ///
    /// * If the worker is interrupted before a permit arrives
    pub fn wait_for(&self, gate: &Receiver<()>) -> Result<(), Interrupted> {
        if gate.try_recv().is_ok() {
            return Ok(());
        }

        flume::Selector::new()
            .recv(gate, |permit| permit.map_err(|_| Interrupted(self.worker)))
            .recv(&self.interrupts, |_| Err(Interrupted(self.worker)))
            .wait()
    }

    /// Whether an interrupt is waiting to be observed.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        !self.interrupts.is_empty() || self.interrupts.is_disconnected()
    }
}
