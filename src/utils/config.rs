//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Optional per-directory settings file (`.parexec.toml`).
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }
}

// ---- Worker threads ----

/// Worker pool sizing.
pub struct PoolLimits;

impl PoolLimits {
    /// Minimum pool size when sizing from hardware parallelism.
    pub const FLOOR_THREADS: usize = 2;
    /// Workers per available core. Units of work are expected to block on I/O part of the time.
    pub const DEFAULT_LOAD_MULTIPLIER: usize = 2;
}

// ---- Timeouts ----

/// Default deadlines for batches and shutdown.
pub struct TimeoutConsts;

impl TimeoutConsts {
    /// Per-unit-of-work allowance; a batch of `n` waits `n` times this (see [`batch_timeout`]).
    pub const PER_TASK: Duration = Duration::from_millis(32_767);
    /// Upper bound on any batch-level deadline. One hour.
    pub const MAX_BATCH: Duration = Duration::from_secs(60 * 60);
    /// How long `stop` waits for in-flight work.
    pub const SHUTDOWN: Duration = Duration::from_secs(30);
}

/// Aggregate deadline for a batch of `n` units of work: `per_task * n`, saturating, capped by `max`.
pub fn batch_timeout(per_task: Duration, n: usize, max: Duration) -> Duration {
    let n = u32::try_from(n).unwrap_or(u32::MAX);
    per_task.saturating_mul(n).min(max)
}

// ---- Hashing ----

/// Hashing I/O thresholds and buffer sizes.
pub struct HashingConsts;

impl HashingConsts {
    /// File size above which hashing uses memory-mapped I/O (bytes). 100 MB.
    pub const HASH_MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;
    /// Chunk size for reading files below mmap threshold (bytes). 1 MB.
    pub const HASH_READ_CHUNK_SIZE: usize = 1024 * 1024;
}
