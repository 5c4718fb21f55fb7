//! Where reload work runs.
//!
//! File notifications arrive on watcher threads. A [`Dispatcher`] decides
//! whether the reload runs right there ([`InlineDispatcher`]) or is handed to
//! an owner that drains a [`DispatchQueue`] on a thread of its choosing.

use crate::error::ReloadError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;
use tracing::debug;

/// A unit of reload work.
pub type ReloadJob = Box<dyn FnOnce() -> Result<(), ReloadError> + Send + 'static>;

/// Marshals reload work onto an execution context.
pub trait Dispatcher: Send + Sync {
    /// Run or enqueue `job`. Inline dispatchers return the job's own result.
    fn dispatch(&self, job: ReloadJob) -> Result<(), ReloadError>;
}

/// Runs every job immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: ReloadJob) -> Result<(), ReloadError> {
        job()
    }
}

/// Sends jobs to a [`DispatchQueue`].
#[derive(Debug, Clone)]
pub struct QueueDispatcher {
    tx: Sender<ReloadJob>,
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, job: ReloadJob) -> Result<(), ReloadError> {
        self.tx.send(job).map_err(|_| ReloadError::DispatchClosed)?;
        debug!("Reload job queued");
        Ok(())
    }
}

/// Receiving end of a [`QueueDispatcher`], pumped by the owning thread.
#[derive(Debug)]
pub struct DispatchQueue {
    rx: Receiver<ReloadJob>,
}

impl DispatchQueue {
    /// Run every job queued so far. Stops at the first failing job and
    /// returns its error; later jobs stay queued.
    pub fn run_pending(&self) -> Result<usize, ReloadError> {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    job()?;
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(ran),
            }
        }
    }

    /// Wait up to `timeout` for one job and run it. `Ok(false)` when none arrived.
    pub fn run_next_timeout(&self, timeout: Duration) -> Result<bool, ReloadError> {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => job().map(|_| true),
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(ReloadError::DispatchClosed),
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// A connected dispatcher and queue.
pub fn queue() -> (QueueDispatcher, DispatchQueue) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (QueueDispatcher { tx }, DispatchQueue { rx })
}
