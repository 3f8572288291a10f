//! Public types shared by the engine, the tracker and the directory submitter.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::config::{PoolLimits, TimeoutConsts, batch_timeout};

/// Options for building a worker pool and running batches on it.
#[derive(Clone, Debug)]
pub struct ExecutorOpts {
    /// Exact pool size. `None` sizes the pool from hardware parallelism.
    pub num_threads: Option<usize>,
    /// Workers per available core when `num_threads` is `None`.
    pub load_multiplier: usize,
    /// Deadline allowance per unit of work in a batch.
    pub per_task_timeout: Duration,
    /// Cap on any batch deadline.
    pub max_batch_timeout: Duration,
    /// How long `stop` waits for in-flight work.
    pub shutdown_timeout: Duration,
    /// Follow symbolic links when walking directories.
    pub follow_links: bool,
}

impl Default for ExecutorOpts {
    fn default() -> Self {
        Self {
            num_threads: None,
            load_multiplier: PoolLimits::DEFAULT_LOAD_MULTIPLIER,
            per_task_timeout: TimeoutConsts::PER_TASK,
            max_batch_timeout: TimeoutConsts::MAX_BATCH,
            shutdown_timeout: TimeoutConsts::SHUTDOWN,
            follow_links: false,
        }
    }
}

impl ExecutorOpts {
    /// Deadline for a batch of `n` units of work.
    pub fn batch_timeout(&self, n: usize) -> Duration {
        batch_timeout(self.per_task_timeout, n, self.max_batch_timeout)
    }
}

/// A unit of work: zero-argument computation producing `V` or failing.
pub type Task<V> = Box<dyn FnOnce() -> anyhow::Result<V> + Send + 'static>;

/// Why a unit of work ended in failure.
#[derive(Debug)]
pub enum TaskFailure {
    /// The computation returned an error.
    Error(anyhow::Error),
    /// The computation panicked; holds the panic message when it was a string.
    Panicked(String),
    /// The helper could not build a unit of work for the operand.
    InvalidOperand(anyhow::Error),
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Error(e) => write!(f, "task failed: {e:#}"),
            TaskFailure::Panicked(msg) => write!(f, "task panicked: {msg}"),
            TaskFailure::InvalidOperand(e) => write!(f, "invalid operand: {e:#}"),
        }
    }
}

/// Why a handle was cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// Explicit cancel request (`cancel`, `cancel_tracker`, `cancel_all`).
    Requested,
    /// Another unit of work in a race-for-first batch succeeded first.
    Superseded,
    /// A batch deadline elapsed before the unit of work finished.
    Timeout,
}

/// Cause passed to [`on_cancelled`](crate::engine::TaskHelper::on_cancelled).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled {
    pub reason: CancelReason,
}

/// Cause passed to [`on_timeout`](crate::engine::TaskHelper::on_timeout).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeout {
    /// The deadline that elapsed, measured from the start of the wait.
    pub after: Duration,
}

/// Final state of a drained handle.
#[derive(Debug)]
pub enum Outcome<V> {
    Success(V),
    Failed(TaskFailure),
    Cancelled(CancelReason),
}

impl<V> Outcome<V> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Classification of a non-successful drain, kept by the directory submitter.
#[derive(Debug)]
pub enum FailureReason {
    Failed(TaskFailure),
    Cancelled(CancelReason),
    TimedOut(Duration),
}

/// A matched file whose unit of work did not succeed.
#[derive(Debug)]
pub struct FailedEntry<V> {
    pub path: PathBuf,
    pub reason: FailureReason,
    /// Value returned by the helper's recovery function for this entry.
    pub recovered: V,
}

/// Results of a directory walk: successes in completion order and failures.
#[derive(Debug)]
pub struct DirectoryReport<V> {
    pub start_directory: Option<PathBuf>,
    pub results: Vec<V>,
    pub failures: Vec<FailedEntry<V>>,
    pub files_visited: usize,
    pub tasks_submitted: usize,
    /// Paths the walk could not read (permission denied, vanished, ...), with the error message.
    pub skipped_paths: Vec<(PathBuf, String)>,
}

/// Operand → result map that iterates in insertion (operand) order.
///
/// Inserting an operand that is already present overwrites its value in place, so the key set
/// always equals the set of distinct operands.
#[derive(Clone, Debug)]
pub struct ResultMap<K, V> {
    entries: Vec<(K, V)>,
    index: HashMap<K, usize>,
}

impl<K, V> Default for ResultMap<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> ResultMap<K, V> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Insert or overwrite; returns the previous value when `key` was present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.index.get(&key) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl<K, V> IntoIterator for ResultMap<K, V> {
    type Item = (K, V);
    type IntoIter = std::vec::IntoIter<(K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
