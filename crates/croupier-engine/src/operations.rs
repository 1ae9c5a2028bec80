//! Cross-thread requests to run work inside the shell's transactions.
//!
//! Coplayer threads cannot open transactions on the shell's resource.
//! They [`submit`](TransactionalOperationManager::submit) a closure
//! instead and receive an [`OperationTicket`]. The shell fires queued
//! closures either opportunistically, inside a heavyweight transaction it
//! already holds, or by opening a dedicated transaction when the
//! manager's signal interrupts its wait.
//!
//! The queue lock is never held while an operation runs, so operations
//! may submit further operations without deadlocking.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use tracing::{debug, trace};

use croupier_core::{CoplayerId, ResourceError, TransactionalResource};

use crate::signal::Signal;

/// Transaction name used by [`TransactionalOperationManager::execute_queued_operations`].
pub const EXECUTE_QUEUED_OPERATIONS: &str = "ExecuteQueuedOperations";

type OperationFn = Box<dyn FnOnce(Option<&dyn TransactionalResource>) + Send>;

struct PendingOperation {
    name: String,
    owner: Option<CoplayerId>,
    run: OperationFn,
}

/// Errors observed by the submitter of an operation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    /// The operation was cancelled before it fired.
    #[error("operation '{name}' was cancelled")]
    Cancelled {
        /// Operation name.
        name: String,
    },
    /// The manager was dropped with the operation still queued.
    #[error("operation manager dropped before the operation fired")]
    ManagerDropped,
}

/// Serializes operations submitted from other threads into the owning
/// runner's transaction stream.
pub struct TransactionalOperationManager {
    queue: Mutex<Vec<PendingOperation>>,
    signal: Signal,
    draining: AtomicBool,
}

impl TransactionalOperationManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            signal: Signal::new(),
            draining: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PendingOperation>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `op` to run inside the owner's next transaction.
    ///
    /// Raises the manager's signal unless a drain is in progress; the
    /// drain re-raises it on completion if the queue is non-empty.
    pub fn submit<T, F>(&self, name: impl Into<String>, op: F) -> OperationTicket<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TransactionalResource) -> T + Send + 'static,
    {
        self.enqueue(None, name.into(), op)
    }

    /// Queue `op` on behalf of coplayer `owner`, so it can be cancelled
    /// with [`cancel_operations_from`](Self::cancel_operations_from).
    pub fn submit_from<T, F>(
        &self,
        owner: CoplayerId,
        name: impl Into<String>,
        op: F,
    ) -> OperationTicket<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TransactionalResource) -> T + Send + 'static,
    {
        self.enqueue(Some(owner), name.into(), op)
    }

    fn enqueue<T, F>(&self, owner: Option<CoplayerId>, name: String, op: F) -> OperationTicket<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TransactionalResource) -> T + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let cancelled_name = name.clone();
        let run: OperationFn = Box::new(move |resource| {
            let outcome = match resource {
                Some(resource) => Ok(op(resource)),
                None => Err(OperationError::Cancelled {
                    name: cancelled_name,
                }),
            };
            // The submitter may have dropped its ticket.
            let _ = tx.send(outcome);
        });

        self.lock().push(PendingOperation {
            name: name.clone(),
            owner,
            run,
        });
        if !self.draining.load(Ordering::SeqCst) {
            self.signal.set();
        }
        trace!(operation = %name, "transactional operation queued");
        OperationTicket { name, rx }
    }

    /// Fire every queued operation against `resource`, which the caller
    /// must already hold a transaction on. Returns the number fired.
    pub fn fire_queued_operations(&self, resource: &dyn TransactionalResource) -> usize {
        self.draining.store(true, Ordering::SeqCst);
        self.signal.reset();
        let batch = mem::take(&mut *self.lock());
        let fired = batch.len();
        for op in batch {
            trace!(operation = %op.name, "firing transactional operation");
            (op.run)(Some(resource));
        }
        self.draining.store(false, Ordering::SeqCst);
        if !self.lock().is_empty() {
            self.signal.set();
        }
        if fired > 0 {
            debug!(fired, "queued operations fired");
        }
        fired
    }

    /// Open a heavyweight transaction solely to fire queued operations.
    ///
    /// If the host refuses the transaction, nothing fires and the signal
    /// is raised again so the owner retries.
    pub fn execute_queued_operations(
        &self,
        resource: &dyn TransactionalResource,
    ) -> Result<usize, ResourceError> {
        let mut fired = 0;
        let opened = resource.open_heavy_transaction(EXECUTE_QUEUED_OPERATIONS, &mut || {
            fired = self.fire_queued_operations(resource);
        })?;
        if !opened && !self.lock().is_empty() {
            trace!("queued operations transaction not opened");
            self.signal.set();
        }
        Ok(fired)
    }

    /// Cancel every queued operation without firing it. Submitters
    /// receive [`OperationError::Cancelled`].
    pub fn cancel_queued_operations(&self) -> usize {
        self.signal.reset();
        let batch = mem::take(&mut *self.lock());
        let cancelled = batch.len();
        for op in batch {
            (op.run)(None);
        }
        if cancelled > 0 {
            debug!(cancelled, "queued operations cancelled");
        }
        cancelled
    }

    /// Cancel the queued operations submitted by `owner`. Other
    /// submitters' operations stay queued.
    pub fn cancel_operations_from(&self, owner: CoplayerId) -> usize {
        let batch: Vec<PendingOperation> = {
            let mut queue = self.lock();
            let (cancelled, kept) = mem::take(&mut *queue)
                .into_iter()
                .partition(|op| op.owner == Some(owner));
            *queue = kept;
            if queue.is_empty() {
                self.signal.reset();
            }
            cancelled
        };
        let cancelled = batch.len();
        for op in batch {
            (op.run)(None);
        }
        if cancelled > 0 {
            debug!(coplayer = %owner, cancelled, "coplayer operations cancelled");
        }
        cancelled
    }

    /// Signal raised while operations are waiting.
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    /// Number of queued operations.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }
}

impl Default for TransactionalOperationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionalOperationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalOperationManager")
            .field("pending", &self.pending_count())
            .field("signal", &self.signal)
            .finish()
    }
}

/// Handle to the result of a submitted operation.
#[derive(Debug)]
pub struct OperationTicket<T> {
    name: String,
    rx: Receiver<Result<T, OperationError>>,
}

impl<T> OperationTicket<T> {
    /// Operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until the operation fires or is cancelled.
    pub fn wait(self) -> Result<T, OperationError> {
        self.rx.recv().map_err(|_| OperationError::ManagerDropped)?
    }

    /// The result, if the operation has already fired or been cancelled.
    pub fn try_wait(&self) -> Option<Result<T, OperationError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(OperationError::ManagerDropped)),
        }
    }

    /// Block for at most `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, OperationError>> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(OperationError::ManagerDropped)),
        }
    }
}
