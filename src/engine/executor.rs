//! Task execution engine: wait-for-all, race-for-first and decoupled submit/drain batches on a
//! shared worker pool, with failure and cancellation bookkeeping per batch.

use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use super::handle::{HandleId, PendingHandle};
use super::helper::TaskHelper;
use super::pool::WorkerPool;
use super::tracker::{CompletionTracker, Completions, Drained, deadline_after, recover};
use crate::error::TaskError;
use crate::types::{
    CancelReason, Cancelled, ExecutorOpts, FailureReason, Outcome, ResultMap, Task, TaskFailure,
    Timeout,
};

/// Per-batch counters for the summary line.
#[derive(Debug, Default)]
struct Tally {
    successful: usize,
    failed: usize,
    cancelled: usize,
}

impl Tally {
    fn total(&self) -> usize {
        self.successful + self.failed + self.cancelled
    }

    fn log(&self) {
        info!(
            "All {} results retrieved. Successful: {}, Failed: {}, Cancelled: {}",
            self.total(),
            self.successful,
            self.failed,
            self.cancelled
        );
    }
}

/// Last non-successful outcome seen by a race-for-first batch.
enum Miss<K> {
    Failed(K, TaskFailure),
    Cancelled(K, CancelReason),
}

/// Runs batches of operands through a [`TaskHelper`] on a shared [`WorkerPool`].
///
/// Per-task failures never abort a batch: every operand gets a value, either its result or the
/// helper's recovery value. Operands whose unit of work failed or was cancelled in the last batch
/// are available from [`failures`](Self::failures) and [`cancellations`](Self::cancellations).
pub struct TaskExecutor<K> {
    pool: Arc<WorkerPool>,
    opts: ExecutorOpts,
    failures: HashSet<K>,
    cancellations: HashSet<K>,
}

impl<K> TaskExecutor<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    /// Executor with default options on its own pool.
    pub fn new() -> Result<Self, TaskError> {
        Self::with_opts(ExecutorOpts::default())
    }

    /// Executor on its own pool sized from `opts`.
    pub fn with_opts(opts: ExecutorOpts) -> Result<Self, TaskError> {
        let pool = Arc::new(WorkerPool::from_opts(&opts)?);
        Ok(Self::with_pool(pool, opts))
    }

    /// Executor over a shared pool. Stopping this executor shuts `pool` down for every user.
    pub fn with_pool(pool: Arc<WorkerPool>, opts: ExecutorOpts) -> Self {
        Self {
            pool,
            opts,
            failures: HashSet::new(),
            cancellations: HashSet::new(),
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn opts(&self) -> &ExecutorOpts {
        &self.opts
    }

    /// Operands whose unit of work failed in the last batch.
    pub fn failures(&self) -> &HashSet<K> {
        &self.failures
    }

    /// Operands whose unit of work was cancelled or timed out in the last batch.
    pub fn cancellations(&self) -> &HashSet<K> {
        &self.cancellations
    }

    /// Build one unit of work per operand without running anything.
    pub fn new_tasks<V, H>(&self, operands: &[K], helper: &H) -> Result<Vec<Task<V>>, TaskError>
    where
        H: TaskHelper<K, V> + ?Sized,
    {
        if operands.is_empty() {
            return Err(TaskError::EmptyBatch);
        }
        operands
            .iter()
            .map(|operand| {
                helper
                    .new_task(operand)
                    .map_err(|e| TaskError::InvalidOperand {
                        operand: format!("{operand:?}"),
                        source: e.into(),
                    })
            })
            .collect()
    }

    /// Run every operand and wait for all of them (deadline from [`ExecutorOpts::batch_timeout`]).
    pub fn execute_all<V, H>(
        &mut self,
        operands: &[K],
        helper: &H,
    ) -> Result<ResultMap<K, V>, TaskError>
    where
        V: Send + 'static,
        H: TaskHelper<K, V> + ?Sized,
    {
        let timeout = self.opts.batch_timeout(operands.len());
        self.execute_all_with_timeout(operands, helper, timeout)
    }

    /// Run every operand and wait up to `timeout` for all of them.
    ///
    /// Units of work still unfinished at the deadline are cancelled and resolved through
    /// `on_timeout`. The returned map has one entry per distinct operand, in operand order.
    pub fn execute_all_with_timeout<V, H>(
        &mut self,
        operands: &[K],
        helper: &H,
        timeout: Duration,
    ) -> Result<ResultMap<K, V>, TaskError>
    where
        V: Send + 'static,
        H: TaskHelper<K, V> + ?Sized,
    {
        self.check_batch(operands)?;
        self.clear_sets();

        let mut batch = Completions::new(Arc::clone(&self.pool));
        let handles = submit_batch(&mut batch, helper, operands)?;
        debug!("Submitted {} tasks; waiting up to {:?}", handles.len(), timeout);

        let deadline = deadline_after(timeout);
        let mut outcomes: HashMap<HandleId, Outcome<V>> = HashMap::with_capacity(handles.len());
        while let Some(drained) = batch.next_or_expire(deadline, CancelReason::Timeout) {
            outcomes.insert(drained.handle.id(), drained.outcome);
        }

        let mut tally = Tally::default();
        let mut results = ResultMap::with_capacity(operands.len());
        for (operand, handle) in operands.iter().zip(&handles) {
            let outcome = outcomes.remove(&handle.id()).unwrap_or_else(|| {
                Outcome::Failed(TaskFailure::Error(anyhow::anyhow!(
                    "task {} was never drained",
                    handle.id()
                )))
            });
            let recovered = recover(helper, operand, outcome, timeout);
            self.settle(operand, recovered.failure.as_ref(), &mut tally);
            results.insert(operand.clone(), recovered.value);
        }
        tally.log();
        Ok(results)
    }

    /// Race every operand and return the first successful result.
    pub fn execute_any<V, H>(&mut self, operands: &[K], helper: &H) -> Result<V, TaskError>
    where
        V: Send + 'static,
        H: TaskHelper<K, V> + ?Sized,
    {
        let timeout = self.opts.batch_timeout(operands.len());
        self.execute_any_with_timeout(operands, helper, timeout)
    }

    /// Race every operand for up to `timeout`.
    ///
    /// The first success wins and the rest are cancelled. Without a success the helper recovers
    /// from the last failure (or cancellation) seen; at the deadline it recovers through
    /// `on_timeout` with no operand.
    pub fn execute_any_with_timeout<V, H>(
        &mut self,
        operands: &[K],
        helper: &H,
        timeout: Duration,
    ) -> Result<V, TaskError>
    where
        V: Send + 'static,
        H: TaskHelper<K, V> + ?Sized,
    {
        self.check_batch(operands)?;
        self.clear_sets();

        let mut batch = Completions::new(Arc::clone(&self.pool));
        submit_batch(&mut batch, helper, operands)?;

        let deadline = deadline_after(timeout);
        let mut last_miss: Option<Miss<K>> = None;
        while let Some(drained) = batch.poll_until(deadline) {
            let Drained {
                operand, outcome, ..
            } = drained;
            match outcome {
                Outcome::Success(value) => {
                    let superseded = batch.cancel_all_with(CancelReason::Superseded);
                    debug!(
                        "First result from {:?}; cancelled {} remaining tasks",
                        operand, superseded
                    );
                    return Ok(value);
                }
                Outcome::Failed(failure) => {
                    debug!("Task failed: {:?}. Cause: {}", operand, failure);
                    self.failures.insert(operand.clone());
                    last_miss = Some(Miss::Failed(operand, failure));
                }
                Outcome::Cancelled(reason) => {
                    self.cancellations.insert(operand.clone());
                    last_miss = Some(Miss::Cancelled(operand, reason));
                }
            }
        }

        if batch.pending_count() > 0 {
            let cancelled = batch.cancel_all_with(CancelReason::Timeout);
            info!(
                "No result within {:?}; cancelled {} remaining tasks",
                timeout, cancelled
            );
            // A task may finish between the deadline and the cancel; keep its real outcome.
            while let Some(drained) = batch.take() {
                match drained.outcome {
                    Outcome::Failed(_) => self.failures.insert(drained.operand),
                    Outcome::Success(_) | Outcome::Cancelled(_) => {
                        self.cancellations.insert(drained.operand)
                    }
                };
            }
            return Ok(helper.on_timeout(&Timeout { after: timeout }, None));
        }

        Ok(match last_miss {
            Some(Miss::Failed(operand, failure)) => {
                info!("All {} tasks failed", operands.len());
                helper.on_execution_failure(&failure, Some(&operand))
            }
            Some(Miss::Cancelled(operand, reason)) => {
                helper.on_cancelled(&Cancelled { reason }, &operand)
            }
            None => helper.on_timeout(&Timeout { after: timeout }, None),
        })
    }

    /// Submit every operand and return immediately with the tracker that will receive them.
    /// Several trackers may be in flight on the same pool.
    pub fn submit_all<V, H>(
        &self,
        operands: &[K],
        helper: Arc<H>,
    ) -> Result<CompletionTracker<K, V>, TaskError>
    where
        V: Send + 'static,
        H: TaskHelper<K, V> + 'static,
    {
        self.check_batch(operands)?;
        let mut tracker = CompletionTracker::new(Arc::clone(&self.pool), helper);
        for operand in operands {
            if let Err(e) = tracker.submit_operand(operand.clone()) {
                tracker.cancel_all();
                return Err(e);
            }
        }
        debug!("Submitted {} tasks", operands.len());
        Ok(tracker)
    }

    /// Drain every pending handle of `tracker` in completion order (deadline from
    /// [`ExecutorOpts::batch_timeout`]).
    pub fn take_all<V>(&mut self, tracker: &mut CompletionTracker<K, V>) -> Vec<V>
    where
        V: Send + 'static,
    {
        let timeout = self.opts.batch_timeout(tracker.pending_count());
        self.take_all_with_timeout(tracker, timeout)
    }

    /// Drain every pending handle of `tracker` in completion order, waiting up to `timeout`.
    /// Handles still pending at the deadline are cancelled and resolved through `on_timeout`.
    pub fn take_all_with_timeout<V>(
        &mut self,
        tracker: &mut CompletionTracker<K, V>,
        timeout: Duration,
    ) -> Vec<V>
    where
        V: Send + 'static,
    {
        self.clear_sets();
        let helper = Arc::clone(tracker.helper());
        let batch = tracker.completions();

        let deadline = deadline_after(timeout);
        let mut tally = Tally::default();
        let mut results = Vec::with_capacity(batch.pending_count());
        while let Some(drained) = batch.next_or_expire(deadline, CancelReason::Timeout) {
            let recovered = recover(helper.as_ref(), &drained.operand, drained.outcome, timeout);
            self.settle(&drained.operand, recovered.failure.as_ref(), &mut tally);
            results.push(recovered.value);
        }
        tally.log();
        results
    }

    /// Cancel `handles`. Returns how many this call cancelled; finished handles are skipped.
    pub fn cancel<V>(&self, handles: &[PendingHandle<V>]) -> Result<usize, TaskError> {
        if handles.is_empty() {
            return Err(TaskError::EmptyBatch);
        }
        let cancelled = handles.iter().filter(|h| h.cancel()).count();
        debug!("Cancelled {} of {} handles", cancelled, handles.len());
        Ok(cancelled)
    }

    /// Cancel every undrained handle of `tracker`.
    pub fn cancel_tracker<V>(&self, tracker: &CompletionTracker<K, V>) -> usize
    where
        V: Send + 'static,
    {
        tracker.cancel_all()
    }

    /// Stop the pool: no new work is accepted, in-flight work may finish within
    /// [`ExecutorOpts::shutdown_timeout`]. Returns true when everything finished in time.
    /// Repeated calls return the first outcome.
    pub fn stop(&mut self) -> bool {
        self.clear_sets();
        self.pool.shutdown(self.opts.shutdown_timeout)
    }

    fn check_batch(&self, operands: &[K]) -> Result<(), TaskError> {
        if operands.is_empty() {
            return Err(TaskError::EmptyBatch);
        }
        if !self.pool.is_accepting() {
            return Err(TaskError::Rejected);
        }
        Ok(())
    }

    fn clear_sets(&mut self) {
        self.failures.clear();
        self.cancellations.clear();
    }

    /// Record the final state of `operand`. A duplicate operand keeps only its last state.
    fn settle(&mut self, operand: &K, failure: Option<&FailureReason>, tally: &mut Tally) {
        self.failures.remove(operand);
        self.cancellations.remove(operand);
        match failure {
            None => tally.successful += 1,
            Some(FailureReason::Failed(_)) => {
                tally.failed += 1;
                self.failures.insert(operand.clone());
            }
            Some(FailureReason::Cancelled(_) | FailureReason::TimedOut(_)) => {
                tally.cancelled += 1;
                self.cancellations.insert(operand.clone());
            }
        }
    }
}

/// Submit one unit of work per operand. On rejection the handles already submitted are
/// cancelled so nothing of the batch keeps running.
fn submit_batch<K, V, H>(
    batch: &mut Completions<K, V>,
    helper: &H,
    operands: &[K],
) -> Result<Vec<PendingHandle<V>>, TaskError>
where
    K: Clone + Debug,
    V: Send + 'static,
    H: TaskHelper<K, V> + ?Sized,
{
    let mut handles = Vec::with_capacity(operands.len());
    for operand in operands {
        match batch.submit_with(helper, operand.clone()) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                batch.cancel_all_with(CancelReason::Requested);
                return Err(e);
            }
        }
    }
    Ok(handles)
}
