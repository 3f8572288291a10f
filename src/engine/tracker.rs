//! Completion tracker: submit units of work, retrieve them in completion order.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::handle::{HandleId, PendingHandle};
use super::helper::TaskHelper;
use super::pool::WorkerPool;
use crate::error::TaskError;
use crate::types::{CancelReason, Cancelled, FailureReason, Outcome, Task, TaskFailure, Timeout};

/// Lifecycle of the batch a tracker belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    /// No unit of work submitted yet.
    Created,
    /// Units of work submitted, none drained.
    Submitted,
    /// At least one handle drained, others still pending.
    Draining,
    /// Every submitted handle drained; the tracker accepts no more work.
    Completed,
}

/// A handle retrieved from the tracker, with its operand and final outcome.
#[derive(Debug)]
pub struct Drained<K, V> {
    pub handle: PendingHandle<V>,
    pub operand: K,
    pub outcome: Outcome<V>,
}

/// Handle bookkeeping shared by [`CompletionTracker`] and the executor's own batches:
/// pool submission, the completion channel and the handle → operand map.
pub(crate) struct Completions<K, V> {
    pool: Arc<WorkerPool>,
    done_tx: Sender<HandleId>,
    done_rx: Receiver<HandleId>,
    pending: HashMap<HandleId, (PendingHandle<V>, K)>,
    next_id: HandleId,
    submitted: usize,
    state: BatchState,
}

impl<K, V> Completions<K, V>
where
    K: Debug,
    V: Send + 'static,
{
    pub(crate) fn new(pool: Arc<WorkerPool>) -> Self {
        let (done_tx, done_rx) = unbounded();
        Self {
            pool,
            done_tx,
            done_rx,
            pending: HashMap::new(),
            next_id: 0,
            submitted: 0,
            state: BatchState::Created,
        }
    }

    pub(crate) fn submit(
        &mut self,
        task: Task<V>,
        operand: K,
    ) -> Result<PendingHandle<V>, TaskError> {
        self.check_open()?;
        let handle = PendingHandle::new(self.next_id, self.done_tx.clone());
        let worker_handle = handle.clone();
        self.pool.spawn(move || worker_handle.run(task))?;
        Ok(self.record(handle, operand))
    }

    /// Ask `helper` for the unit of work of `operand` and submit it. A helper error yields a
    /// handle that is already failed with [`TaskFailure::InvalidOperand`].
    pub(crate) fn submit_with<H>(
        &mut self,
        helper: &H,
        operand: K,
    ) -> Result<PendingHandle<V>, TaskError>
    where
        H: TaskHelper<K, V> + ?Sized,
    {
        match helper.new_task(&operand) {
            Ok(task) => self.submit(task, operand),
            Err(e) => {
                self.check_open()?;
                if !self.pool.is_accepting() {
                    return Err(TaskError::Rejected);
                }
                debug!("Invalid operand {:?}: {:#}", operand, e);
                let handle = PendingHandle::failed(
                    self.next_id,
                    self.done_tx.clone(),
                    TaskFailure::InvalidOperand(e),
                );
                Ok(self.record(handle, operand))
            }
        }
    }

    fn check_open(&self) -> Result<(), TaskError> {
        if self.state == BatchState::Completed {
            return Err(TaskError::BatchCompleted);
        }
        Ok(())
    }

    fn record(&mut self, handle: PendingHandle<V>, operand: K) -> PendingHandle<V> {
        self.next_id += 1;
        self.submitted += 1;
        self.pending.insert(handle.id(), (handle.clone(), operand));
        if self.state == BatchState::Created {
            self.state = BatchState::Submitted;
        }
        handle
    }

    pub(crate) fn take(&mut self) -> Option<Drained<K, V>> {
        while !self.pending.is_empty() {
            let id = self.done_rx.recv().ok()?;
            if let Some(drained) = self.drain(id) {
                return Some(drained);
            }
        }
        None
    }

    pub(crate) fn poll(&mut self, timeout: Duration) -> Option<Drained<K, V>> {
        self.poll_until(deadline_after(timeout))
    }

    /// `None` waits without a deadline.
    pub(crate) fn poll_until(&mut self, deadline: Option<Instant>) -> Option<Drained<K, V>> {
        while !self.pending.is_empty() {
            let id = match deadline {
                Some(at) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    self.done_rx.recv_timeout(remaining).ok()?
                }
                None => self.done_rx.recv().ok()?,
            };
            if let Some(drained) = self.drain(id) {
                return Some(drained);
            }
        }
        None
    }

    /// Next drained handle before `deadline`. Once the deadline passes, every pending handle is
    /// cancelled with `reason` and drained in turn; `None` when nothing is left.
    pub(crate) fn next_or_expire(
        &mut self,
        deadline: Option<Instant>,
        reason: CancelReason,
    ) -> Option<Drained<K, V>> {
        if let Some(drained) = self.poll_until(deadline) {
            return Some(drained);
        }
        if self.pending.is_empty() {
            return None;
        }
        let cancelled = self.cancel_all_with(reason);
        if cancelled > 0 {
            info!("Deadline elapsed; cancelled {} unfinished tasks", cancelled);
        }
        // Every pending handle is now finished or cancelled: one notification each is on its way.
        self.take()
    }

    pub(crate) fn try_poll(&mut self) -> Option<Drained<K, V>> {
        while !self.pending.is_empty() {
            let id = self.done_rx.try_recv().ok()?;
            if let Some(drained) = self.drain(id) {
                return Some(drained);
            }
        }
        None
    }

    /// Remove `id` from the pending map. Ids of handles drained earlier (a late notification
    /// after a cancel, for example) are ignored.
    fn drain(&mut self, id: HandleId) -> Option<Drained<K, V>> {
        let (handle, operand) = self.pending.remove(&id)?;
        let outcome = handle.take_outcome().unwrap_or_else(|| {
            Outcome::Failed(TaskFailure::Error(anyhow::anyhow!(
                "outcome of task {id} was already taken"
            )))
        });
        // Release anything still tied to the handle; no-op once it has finished.
        handle.cancel();
        self.state = if self.pending.is_empty() {
            BatchState::Completed
        } else {
            BatchState::Draining
        };
        Some(Drained {
            handle,
            operand,
            outcome,
        })
    }

    pub(crate) fn cancel_all_with(&self, reason: CancelReason) -> usize {
        let cancelled = self
            .pending
            .values()
            .filter(|(handle, _)| handle.cancel_with(reason))
            .count();
        if cancelled > 0 {
            debug!("Cancelled {} pending tasks ({:?})", cancelled, reason);
        }
        cancelled
    }
}

impl<K, V> Completions<K, V> {
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn submitted(&self) -> usize {
        self.submitted
    }

    pub(crate) fn state(&self) -> BatchState {
        self.state
    }

    pub(crate) fn operand_for(&self, handle: &PendingHandle<V>) -> Option<&K> {
        self.pending.get(&handle.id()).map(|(_, operand)| operand)
    }

    pub(crate) fn handles(&self) -> impl Iterator<Item = &PendingHandle<V>> {
        self.pending.values().map(|(handle, _)| handle)
    }

    pub(crate) fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }
}

/// Pairs each submitted unit of work with its operand and hands back finished work in the
/// order it finishes (not the order it was submitted).
///
/// A tracker belongs to one batch. Many trackers may share one [`WorkerPool`]; a single tracker
/// is drained by one caller at a time (drain methods take `&mut self`).
pub struct CompletionTracker<K, V> {
    inner: Completions<K, V>,
    helper: Arc<dyn TaskHelper<K, V>>,
}

impl<K, V> CompletionTracker<K, V>
where
    K: Debug,
    V: Send + 'static,
{
    pub fn new(pool: Arc<WorkerPool>, helper: Arc<dyn TaskHelper<K, V>>) -> Self {
        Self {
            inner: Completions::new(pool),
            helper,
        }
    }

    /// Enqueue `task` on the pool and remember which operand it belongs to. Never blocks.
    ///
    /// Fails with [`TaskError::Rejected`] once the pool is shut down, and with
    /// [`TaskError::BatchCompleted`] once every earlier handle has been drained.
    pub fn submit(&mut self, task: Task<V>, operand: K) -> Result<PendingHandle<V>, TaskError> {
        self.inner.submit(task, operand)
    }

    /// Build the unit of work for `operand` with this tracker's helper and submit it.
    /// A helper error yields a handle that is already failed with
    /// [`TaskFailure::InvalidOperand`]; it is drained like any other failure.
    pub fn submit_operand(&mut self, operand: K) -> Result<PendingHandle<V>, TaskError> {
        self.inner.submit_with(self.helper.as_ref(), operand)
    }

    /// Block until any pending unit of work finishes. `None` when nothing is pending.
    pub fn take(&mut self) -> Option<Drained<K, V>> {
        self.inner.take()
    }

    /// Like [`take`](Self::take), but gives up after `timeout`.
    pub fn poll(&mut self, timeout: Duration) -> Option<Drained<K, V>> {
        self.inner.poll(timeout)
    }

    /// Non-blocking retrieval of an already finished unit of work.
    pub fn try_poll(&mut self) -> Option<Drained<K, V>> {
        self.inner.try_poll()
    }

    /// Request cancellation of every undrained handle. Returns how many this call cancelled.
    pub fn cancel_all(&self) -> usize {
        self.inner.cancel_all_with(CancelReason::Requested)
    }

    pub(crate) fn completions(&mut self) -> &mut Completions<K, V> {
        &mut self.inner
    }
}

impl<K, V> CompletionTracker<K, V> {
    /// Submitted-but-undrained handles.
    pub fn pending_count(&self) -> usize {
        self.inner.pending_count()
    }

    /// Total handles ever submitted through this tracker.
    pub fn submitted(&self) -> usize {
        self.inner.submitted()
    }

    pub fn state(&self) -> BatchState {
        self.inner.state()
    }

    /// Operand of an undrained handle.
    pub fn operand_for(&self, handle: &PendingHandle<V>) -> Option<&K> {
        self.inner.operand_for(handle)
    }

    /// Undrained handles, in no particular order.
    pub fn handles(&self) -> impl Iterator<Item = &PendingHandle<V>> {
        self.inner.handles()
    }

    pub fn helper(&self) -> &Arc<dyn TaskHelper<K, V>> {
        &self.helper
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        self.inner.pool()
    }
}

/// Value recovered for one drained handle, plus why it was not a success.
pub(crate) struct Recovered<V> {
    pub value: V,
    pub failure: Option<FailureReason>,
}

/// Turn a drained outcome into a value, invoking the matching recovery function.
/// Deadline `timeout` from now, or `None` when it lies beyond what `Instant` can represent.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// `waited` is the deadline reported to `on_timeout` for handles cancelled by a timeout.
pub(crate) fn recover<K, V, H>(
    helper: &H,
    operand: &K,
    outcome: Outcome<V>,
    waited: Duration,
) -> Recovered<V>
where
    K: Debug,
    H: TaskHelper<K, V> + ?Sized,
{
    match outcome {
        Outcome::Success(value) => Recovered {
            value,
            failure: None,
        },
        Outcome::Failed(failure) => {
            warn!("Task failed: {:?}. Cause: {}", operand, failure);
            Recovered {
                value: helper.on_execution_failure(&failure, Some(operand)),
                failure: Some(FailureReason::Failed(failure)),
            }
        }
        Outcome::Cancelled(CancelReason::Timeout) => {
            info!("Task timed out after {:?}: {:?}", waited, operand);
            Recovered {
                value: helper.on_timeout(&Timeout { after: waited }, Some(operand)),
                failure: Some(FailureReason::TimedOut(waited)),
            }
        }
        Outcome::Cancelled(reason) => {
            info!("Task cancelled: {:?}. Cause: {:?}", operand, reason);
            Recovered {
                value: helper.on_cancelled(&Cancelled { reason }, operand),
                failure: Some(FailureReason::Cancelled(reason)),
            }
        }
    }
}
