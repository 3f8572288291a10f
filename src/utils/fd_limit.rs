//! Worker pool cap derived from the process open-file limit (`RLIMIT_NOFILE`).

/// Descriptors one busy worker is assumed to hold: the file being read, its mmap and a directory
/// handle from the walk, plus one spare.
pub const FDS_PER_WORKER: usize = 4;

/// Percent of the soft limit the pool may claim; the rest stays with the caller.
const POOL_SHARE_PERCENT: u64 = 80;

/// Soft open-file limit, or `None` when it is unlimited or cannot be read.
#[cfg(unix)]
pub fn soft_nofile_limit() -> Option<u64> {
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) } != 0 {
        return None;
    }
    if rlim.rlim_cur == libc::RLIM_INFINITY {
        return None;
    }
    Some(u64::from(rlim.rlim_cur))
}

#[cfg(not(unix))]
pub fn soft_nofile_limit() -> Option<u64> {
    None
}

/// Pool size that fits a descriptor limit of `limit`. Never below one worker.
pub fn pool_cap_for(limit: u64) -> usize {
    let budget = limit.saturating_mul(POOL_SHARE_PERCENT) / 100;
    let workers = budget / FDS_PER_WORKER as u64;
    usize::try_from(workers).unwrap_or(usize::MAX).max(1)
}

/// Largest pool this process can run without exhausting descriptors, or `None` without a limit.
pub fn max_pool_size_by_fd_limit() -> Option<usize> {
    soft_nofile_limit().map(pool_cap_for)
}
