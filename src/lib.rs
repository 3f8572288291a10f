//! Parexec: run a batch of operands as parallel units of work and collect one result per operand.
//!
//! A [`TaskHelper`] turns each operand into a unit of work and supplies fallback values for work
//! that fails, is cancelled or times out. [`TaskExecutor`] runs batches under three disciplines:
//! wait for all ([`execute_all`](TaskExecutor::execute_all)), race for the first success
//! ([`execute_any`](TaskExecutor::execute_any)) and decoupled submit/drain
//! ([`submit_all`](TaskExecutor::submit_all) + [`take_all`](TaskExecutor::take_all)).
//! [`scan_dir`] drives the same machinery from the files of a directory tree.

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod scan;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use engine::{
    BatchState, CompletionTracker, Drained, FnTaskHelper, PendingHandle, TaskExecutor, TaskHelper,
    WorkerPool, interrupted,
};
pub use error::TaskError;
pub use pipeline::{DirectorySubmitter, NameMatcher};
pub use scan::scan_dir;

/// Result alias used by the directory-level API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
