//! Work item factory: builds one unit of work per operand and recovers from failures.

use crate::types::{Cancelled, Task, TaskFailure, Timeout};

/// Creates tasks and supplies fallback results for tasks that do not succeed.
///
/// `new_task` runs on the submitting thread; the recovery functions run on the draining thread.
/// Recovery functions must be total: they are the last step for a failed operand and a panic
/// in one of them propagates to the batch caller.
pub trait TaskHelper<K, V>: Send + Sync {
    /// Build the unit of work for `operand`. An error marks the operand as invalid; the engine
    /// records it as a failed task rather than aborting the batch.
    fn new_task(&self, operand: &K) -> anyhow::Result<Task<V>>;

    /// Fallback for a unit of work that returned an error or panicked.
    /// `operand` is `None` only when the failing operand is unknown to the caller.
    fn on_execution_failure(&self, cause: &TaskFailure, operand: Option<&K>) -> V;

    /// Fallback for a unit of work that was cancelled.
    fn on_cancelled(&self, cause: &Cancelled, operand: &K) -> V;

    /// Fallback for a deadline that elapsed before completion.
    /// `operand` is `None` for race-for-first batches where no single operand timed out.
    fn on_timeout(&self, cause: &Timeout, operand: Option<&K>) -> V;
}

type NewTaskFn<K, V> = Box<dyn Fn(&K) -> anyhow::Result<Task<V>> + Send + Sync>;
type FailureFn<K, V> = Box<dyn Fn(&TaskFailure, Option<&K>) -> V + Send + Sync>;
type CancelFn<K, V> = Box<dyn Fn(&Cancelled, &K) -> V + Send + Sync>;
type TimeoutFn<K, V> = Box<dyn Fn(&Timeout, Option<&K>) -> V + Send + Sync>;

/// [`TaskHelper`] assembled from closures.
///
/// ```
/// use parexec::engine::FnTaskHelper;
///
/// let helper = FnTaskHelper::new(|x: &f64| {
///     let x = *x;
///     Ok(Box::new(move || Ok(x.ln())) as parexec::Task<f64>)
/// })
/// .with_fallback(f64::NAN);
/// # let _ = helper;
/// ```
pub struct FnTaskHelper<K, V> {
    new_task: NewTaskFn<K, V>,
    on_failure: FailureFn<K, V>,
    on_cancelled: CancelFn<K, V>,
    on_timeout: TimeoutFn<K, V>,
}

impl<K: 'static, V: Default + 'static> FnTaskHelper<K, V> {
    /// Helper whose recovery functions all return `V::default()` until overridden.
    pub fn new<F>(new_task: F) -> Self
    where
        F: Fn(&K) -> anyhow::Result<Task<V>> + Send + Sync + 'static,
    {
        Self {
            new_task: Box::new(new_task),
            on_failure: Box::new(|_, _| V::default()),
            on_cancelled: Box::new(|_, _| V::default()),
            on_timeout: Box::new(|_, _| V::default()),
        }
    }
}

impl<K: 'static, V: 'static> FnTaskHelper<K, V> {
    /// Use `value` as the result of every recovery function.
    pub fn with_fallback(self, value: V) -> Self
    where
        V: Clone + Send + Sync,
    {
        let (a, b, c) = (value.clone(), value.clone(), value);
        Self {
            new_task: self.new_task,
            on_failure: Box::new(move |_, _| a.clone()),
            on_cancelled: Box::new(move |_, _| b.clone()),
            on_timeout: Box::new(move |_, _| c.clone()),
        }
    }

    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskFailure, Option<&K>) -> V + Send + Sync + 'static,
    {
        self.on_failure = Box::new(f);
        self
    }

    pub fn on_cancelled<F>(mut self, f: F) -> Self
    where
        F: Fn(&Cancelled, &K) -> V + Send + Sync + 'static,
    {
        self.on_cancelled = Box::new(f);
        self
    }

    pub fn on_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn(&Timeout, Option<&K>) -> V + Send + Sync + 'static,
    {
        self.on_timeout = Box::new(f);
        self
    }
}

impl<K, V> TaskHelper<K, V> for FnTaskHelper<K, V> {
    fn new_task(&self, operand: &K) -> anyhow::Result<Task<V>> {
        (self.new_task)(operand)
    }

    fn on_execution_failure(&self, cause: &TaskFailure, operand: Option<&K>) -> V {
        (self.on_failure)(cause, operand)
    }

    fn on_cancelled(&self, cause: &Cancelled, operand: &K) -> V {
        (self.on_cancelled)(cause, operand)
    }

    fn on_timeout(&self, cause: &Timeout, operand: Option<&K>) -> V {
        (self.on_timeout)(cause, operand)
    }
}
