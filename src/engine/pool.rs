//! Shared bounded worker pool with orderly shutdown.

use log::{debug, info, warn};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use crate::error::TaskError;
use crate::types::ExecutorOpts;
use crate::utils::config::PoolLimits;
use crate::utils::fd_limit::max_pool_size_by_fd_limit;

#[derive(Default)]
struct GateState {
    stopped: bool,
    in_flight: usize,
}

/// Admission gate: tracks accepted-but-unfinished jobs so shutdown can wait for them.
#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    drained: Condvar,
}

impl Gate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decrements the in-flight count when a job ends, however it ends.
struct InFlight<'a>(&'a Gate);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.0.drained.notify_all();
        }
    }
}

/// Fixed-size worker pool shared by every batch (and every executor) built on it.
///
/// Submission never blocks. [`shutdown`](Self::shutdown) is irreversible: afterwards every
/// submission fails with [`TaskError::Rejected`].
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    gate: Arc<Gate>,
    threads: usize,
    shutdown_outcome: OnceLock<bool>,
}

impl WorkerPool {
    /// Pool with exactly `threads` workers (at least one).
    pub fn new(threads: usize) -> Result<Self, TaskError> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("{}-worker-{i}", env!("CARGO_PKG_NAME")))
            .panic_handler(|_| log::error!("worker job panicked outside a task"))
            .build()?;
        debug!("Worker pool started with {} threads", threads);
        Ok(Self {
            pool,
            gate: Default::default(),
            threads,
            shutdown_outcome: OnceLock::new(),
        })
    }

    /// Pool sized from `opts`: explicit thread count, else hardware parallelism times the load
    /// multiplier, capped by the file-descriptor limit.
    pub fn from_opts(opts: &ExecutorOpts) -> Result<Self, TaskError> {
        Self::new(pool_size(opts))
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn is_accepting(&self) -> bool {
        !self.gate.lock().stopped
    }

    /// Jobs accepted but not yet finished (queued or running).
    pub fn in_flight(&self) -> usize {
        self.gate.lock().in_flight
    }

    /// Enqueue `job`. Fails with [`TaskError::Rejected`] once the pool is shut down.
    pub(crate) fn spawn<F>(&self, job: F) -> Result<(), TaskError>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.gate.lock();
            if state.stopped {
                return Err(TaskError::Rejected);
            }
            state.in_flight += 1;
        }
        let gate = Arc::clone(&self.gate);
        self.pool.spawn(move || {
            let _in_flight = InFlight(&gate);
            job();
        });
        Ok(())
    }

    /// Stop accepting work and wait up to `timeout` for in-flight jobs to finish.
    ///
    /// Returns true if the pool drained in time. Repeated calls return the first outcome.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        *self.shutdown_outcome.get_or_init(|| {
            info!("Executor shutdown requested.");
            let mut state = self.gate.lock();
            state.stopped = true;
            let (state, wait) = self
                .gate
                .drained
                .wait_timeout_while(state, timeout, |s| s.in_flight > 0)
                .unwrap_or_else(PoisonError::into_inner);
            if wait.timed_out() {
                warn!(
                    "Shutdown timed out after {:?} with {} tasks still in flight",
                    timeout, state.in_flight
                );
                false
            } else {
                debug!("Worker pool drained");
                true
            }
        })
    }
}

fn pool_size(opts: &ExecutorOpts) -> usize {
    if let Some(n) = opts.num_threads {
        return n.max(1);
    }
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(PoolLimits::FLOOR_THREADS);
    let wanted = parallelism
        .saturating_mul(opts.load_multiplier.max(1))
        .max(PoolLimits::FLOOR_THREADS);
    match max_pool_size_by_fd_limit() {
        Some(fd_cap) if fd_cap < wanted => {
            debug!(
                "Capping pool at {} workers (wanted {}) for the open-file limit",
                fd_cap, wanted
            );
            fd_cap
        }
        _ => wanted,
    }
}
