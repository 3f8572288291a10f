//! Pending handles: the live link between a submitted unit of work and its outcome.

use crossbeam_channel::Sender;
use log::debug;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::types::{CancelReason, Outcome, Task, TaskFailure};

/// Identifier of a handle, unique within its tracker.
pub type HandleId = u64;

// Status byte. Cancelled states carry their reason so a single CAS decides the winner.
const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const COMPLETED: u8 = 2;
const CANCELLED_REQUESTED: u8 = 3;
const CANCELLED_SUPERSEDED: u8 = 4;
const CANCELLED_TIMEOUT: u8 = 5;

fn encode(reason: CancelReason) -> u8 {
    match reason {
        CancelReason::Requested => CANCELLED_REQUESTED,
        CancelReason::Superseded => CANCELLED_SUPERSEDED,
        CancelReason::Timeout => CANCELLED_TIMEOUT,
    }
}

fn decode(status: u8) -> Option<CancelReason> {
    match status {
        CANCELLED_REQUESTED => Some(CancelReason::Requested),
        CANCELLED_SUPERSEDED => Some(CancelReason::Superseded),
        CANCELLED_TIMEOUT => Some(CancelReason::Timeout),
        _ => None,
    }
}

/// Anything a running unit of work can ask "was I cancelled?".
trait Interruptible: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<dyn Interruptible>>> = const { RefCell::new(None) };
}

/// True when the unit of work running on this thread has been cancelled.
///
/// Long-running units of work should poll this and unwind early; cancellation of a running
/// unit of work is otherwise best-effort (its result is discarded once it finishes).
/// Always false outside a worker.
pub fn interrupted() -> bool {
    CURRENT.with(|c| c.borrow().as_ref().is_some_and(|s| s.is_cancelled()))
}

struct TaskState<V> {
    id: HandleId,
    status: AtomicU8,
    result: Mutex<Option<Result<V, TaskFailure>>>,
    done_tx: Sender<HandleId>,
}

impl<V: Send> Interruptible for TaskState<V> {
    fn is_cancelled(&self) -> bool {
        decode(self.status.load(Ordering::Acquire)).is_some()
    }
}

impl<V> TaskState<V> {
    fn notify(&self) {
        // Receiver gone means the tracker was dropped; nobody is waiting.
        let _ = self.done_tx.send(self.id);
    }
}

/// Handle to the eventual outcome of one submitted unit of work.
///
/// Clones share the same state. The outcome of a successful or failed unit of work can be
/// taken once; cancellation is sticky and may be observed any number of times.
pub struct PendingHandle<V> {
    state: Arc<TaskState<V>>,
}

impl<V> Clone for PendingHandle<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<V> fmt::Debug for PendingHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingHandle")
            .field("id", &self.state.id)
            .field("status", &self.state.status.load(Ordering::Relaxed))
            .finish()
    }
}

impl<V: Send + 'static> PendingHandle<V> {
    pub(crate) fn new(id: HandleId, done_tx: Sender<HandleId>) -> Self {
        Self {
            state: Arc::new(TaskState {
                id,
                status: AtomicU8::new(PENDING),
                result: Mutex::new(None),
                done_tx,
            }),
        }
    }

    /// Handle that is already finished with `failure` (the helper could not build a task).
    pub(crate) fn failed(id: HandleId, done_tx: Sender<HandleId>, failure: TaskFailure) -> Self {
        let handle = Self::new(id, done_tx);
        *handle.lock_result() = Some(Err(failure));
        handle.state.status.store(COMPLETED, Ordering::Release);
        handle.state.notify();
        handle
    }

    /// Run `task` on the current (worker) thread and publish its outcome.
    /// Does nothing when the handle was cancelled before the worker picked it up.
    pub(crate) fn run(&self, task: Task<V>) {
        let state = &self.state;
        if state
            .status
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("task {} cancelled before start", state.id);
            return;
        }

        let current: Arc<dyn Interruptible> = Arc::clone(&self.state) as Arc<dyn Interruptible>;
        CURRENT.with(|c| *c.borrow_mut() = Some(current));
        let result = match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(TaskFailure::Error(e)),
            Err(payload) => Err(TaskFailure::Panicked(panic_message(payload.as_ref()))),
        };
        CURRENT.with(|c| *c.borrow_mut() = None);

        *self.lock_result() = Some(result);
        if state
            .status
            .compare_exchange(RUNNING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            state.notify();
        } else {
            // Cancelled while running: the canceller already notified, drop the late result.
            self.lock_result().take();
            debug!("task {} finished after cancellation; result discarded", state.id);
        }
    }
}

impl<V> PendingHandle<V> {
    pub fn id(&self) -> HandleId {
        self.state.id
    }

    /// True once the unit of work completed or was cancelled.
    pub fn is_done(&self) -> bool {
        self.state.status.load(Ordering::Acquire) >= COMPLETED
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_reason().is_some()
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        decode(self.state.status.load(Ordering::Acquire))
    }

    /// Request cancellation. Returns true if this call cancelled the handle; false when it had
    /// already completed or been cancelled (a no-op).
    pub fn cancel(&self) -> bool {
        self.cancel_with(CancelReason::Requested)
    }

    pub(crate) fn cancel_with(&self, reason: CancelReason) -> bool {
        let target = encode(reason);
        let mut current = self.state.status.load(Ordering::Acquire);
        while current == PENDING || current == RUNNING {
            match self.state.status.compare_exchange_weak(
                current,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.state.notify();
                    return true;
                }
                Err(observed) => current = observed,
            }
        }
        false
    }

    /// Take the outcome. `None` while the unit of work is still pending or running, or when a
    /// completed outcome has already been taken.
    pub(crate) fn take_outcome(&self) -> Option<Outcome<V>> {
        let status = self.state.status.load(Ordering::Acquire);
        if let Some(reason) = decode(status) {
            return Some(Outcome::Cancelled(reason));
        }
        if status != COMPLETED {
            return None;
        }
        self.lock_result().take().map(|r| match r {
            Ok(v) => Outcome::Success(v),
            Err(failure) => Outcome::Failed(failure),
        })
    }

    fn lock_result(&self) -> std::sync::MutexGuard<'_, Option<Result<V, TaskFailure>>> {
        self.state
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
