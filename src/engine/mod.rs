//! Engine module: task lifecycle, completion tracking and batch execution

pub mod arg_parser;
pub mod cli;
pub mod executor;
pub mod handle;
pub mod hashing;
pub mod helper;
pub mod pool;
pub mod tracker;

// Re-export commonly used items
pub use arg_parser::Cli;
pub use cli::handle_run;
pub use executor::TaskExecutor;
pub use handle::{HandleId, PendingHandle, interrupted};
pub use hashing::{FileDigest, HashHelper, hash_file};
pub use helper::{FnTaskHelper, TaskHelper};
pub use pool::WorkerPool;
pub use tracker::{BatchState, CompletionTracker, Drained};
