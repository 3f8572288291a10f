//! Directory scanning: walk a tree and run one unit of work per matching file.

use anyhow::{Result, bail};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::engine::helper::TaskHelper;
use crate::engine::pool::WorkerPool;
use crate::pipeline::{DirectorySubmitter, walk_events};
use crate::types::{DirectoryReport, ExecutorOpts};

/// Walk `root`, submit a unit of work for every file whose name matches `pattern`
/// (`glob:...` or `regex:...`), and collect the results once the walk leaves `root`.
///
/// Unreadable entries are logged and listed in [`DirectoryReport::skipped_paths`]; the walk
/// continues past them. Fails on an invalid pattern, a missing root, or a shut-down pool.
pub fn scan_dir<V, H>(
    root: &Path,
    pattern: &str,
    helper: Arc<H>,
    pool: Arc<WorkerPool>,
    opts: &ExecutorOpts,
) -> Result<DirectoryReport<V>>
where
    V: Send + 'static,
    H: TaskHelper<PathBuf, V> + 'static,
{
    if !root.exists() {
        bail!("{} does not exist", root.display());
    }
    let started = Instant::now();
    let mut submitter = DirectorySubmitter::new(pattern, helper, pool, opts.clone())?;
    for event in walk_events(root, opts.follow_links) {
        submitter.visit(event)?;
    }
    submitter.finish();
    debug!("Scanned {} in {:?}", root.display(), started.elapsed());
    Ok(submitter.into_report())
}
