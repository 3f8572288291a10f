//! Structural errors raised to batch callers.
//!
//! Per-task failures never show up here; they are routed through the
//! [`TaskHelper`](crate::engine::TaskHelper) recovery functions instead.

use thiserror::Error;

/// Errors that abort a single engine call before (or instead of) running any work.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The operand collection (or handle collection) was empty.
    #[error("collection cannot be empty")]
    EmptyBatch,

    /// The worker pool has been shut down and no longer accepts work.
    #[error("worker pool is shut down; task rejected")]
    Rejected,

    /// The tracker was fully drained and cannot accept further submissions.
    #[error("batch already completed; create a new tracker")]
    BatchCompleted,

    /// The task helper could not build a unit of work for an operand.
    #[error("invalid operand {operand}: {source}")]
    InvalidOperand {
        operand: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Pattern did not take the form `syntax:pattern`.
    #[error("pattern must take the form syntax:pattern, got {0:?}")]
    MissingSyntax(String),

    /// Pattern syntax other than `glob` or `regex`.
    #[error("unsupported pattern syntax {0:?} (expected glob or regex)")]
    UnsupportedSyntax(String),

    /// Glob or regex failed to compile.
    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The worker pool could not be built.
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
