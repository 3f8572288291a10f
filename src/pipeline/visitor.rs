//! Directory-driven submitter: one unit of work per matching file, drained when the walk leaves
//! the start directory.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::matcher::NameMatcher;
use super::walk::WalkEvent;
use crate::engine::helper::TaskHelper;
use crate::engine::pool::WorkerPool;
use crate::engine::tracker::{CompletionTracker, deadline_after, recover};
use crate::error::TaskError;
use crate::types::{CancelReason, DirectoryReport, ExecutorOpts, FailedEntry};

/// Filesystem identity of a directory: device and inode.
#[cfg(unix)]
type DirId = (u64, u64);

/// Filesystem identity of a directory: its canonical path.
#[cfg(not(unix))]
type DirId = PathBuf;

#[cfg(unix)]
fn dir_id(path: &Path) -> Option<DirId> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn dir_id(path: &Path) -> Option<DirId> {
    std::fs::canonicalize(path).ok()
}

/// Submits a unit of work for every visited file whose name matches, and collects the results
/// once the walk leaves the directory it started in.
///
/// Feed it [`WalkEvent`]s (see [`walk_events`](super::walk::walk_events)) or call the `visit_*`
/// methods directly. Successes land in [`results`](Self::results) in completion order; failed,
/// cancelled and timed-out files land in [`failures`](Self::failures).
pub struct DirectorySubmitter<V> {
    matcher: NameMatcher,
    tracker: CompletionTracker<PathBuf, V>,
    opts: ExecutorOpts,
    start: Option<(PathBuf, Option<DirId>)>,
    files_visited: usize,
    tasks_submitted: usize,
    results: Vec<V>,
    failures: Vec<FailedEntry<V>>,
    skipped_paths: Vec<(PathBuf, String)>,
}

impl<V: Send + 'static> DirectorySubmitter<V> {
    /// `pattern` takes the form `glob:...` or `regex:...` and is matched against file names only.
    pub fn new<H>(
        pattern: &str,
        helper: Arc<H>,
        pool: Arc<WorkerPool>,
        opts: ExecutorOpts,
    ) -> Result<Self, TaskError>
    where
        H: TaskHelper<PathBuf, V> + 'static,
    {
        let matcher = NameMatcher::new(pattern)?;
        debug!("Matching {:?} on a pool of {} threads", matcher, pool.threads());
        Ok(Self {
            matcher,
            tracker: CompletionTracker::new(pool, helper),
            opts,
            start: None,
            files_visited: 0,
            tasks_submitted: 0,
            results: Vec::new(),
            failures: Vec::new(),
            skipped_paths: Vec::new(),
        })
    }

    /// Dispatch one walk event.
    pub fn visit(&mut self, event: WalkEvent) -> Result<(), TaskError> {
        match event {
            WalkEvent::EnterDir(dir) => self.pre_visit_directory(&dir),
            WalkEvent::File(file) => self.visit_file(file)?,
            WalkEvent::ExitDir(dir) => self.post_visit_directory(&dir),
            WalkEvent::Err { msg, path } => self.visit_file_failed(path, msg),
        }
        Ok(())
    }

    /// The first directory entered becomes the start directory and resets the accumulators.
    pub fn pre_visit_directory(&mut self, dir: &Path) {
        if self.start.is_none() {
            debug!("Starting in: {}", dir.display());
            self.start = Some((dir.to_path_buf(), dir_id(dir)));
            self.results.clear();
            self.failures.clear();
        }
    }

    /// Submit a unit of work when the file name matches. Fails only when the pool no longer
    /// accepts work.
    pub fn visit_file(&mut self, file: PathBuf) -> Result<(), TaskError> {
        self.files_visited += 1;
        if !self.matcher.matches(&file) {
            debug!("File non-match: {}", file.display());
            return Ok(());
        }
        debug!("File match: {}", file.display());
        self.tracker.submit_operand(file)?;
        self.tasks_submitted += 1;
        Ok(())
    }

    /// Record an entry the walk could not read; the walk goes on.
    pub fn visit_file_failed(&mut self, path: Option<PathBuf>, msg: String) {
        let path = path.unwrap_or_else(|| PathBuf::from("<unknown>"));
        warn!("File visit failed: {}: {}", path.display(), msg);
        self.skipped_paths.push((path, msg));
    }

    /// Leaving the start directory drains every pending unit of work.
    pub fn post_visit_directory(&mut self, dir: &Path) {
        if self.is_start_directory(dir) {
            self.drain();
        }
    }

    fn is_start_directory(&self, dir: &Path) -> bool {
        let Some((start, start_id)) = &self.start else {
            return false;
        };
        match (start_id, dir_id(dir)) {
            (Some(a), Some(b)) => *a == b,
            _ => start == dir,
        }
    }

    /// Drain whatever is still pending (a walk rooted at a file never leaves a directory).
    pub fn finish(&mut self) {
        if self.tracker.pending_count() > 0 {
            self.drain();
        }
    }

    fn drain(&mut self) {
        info!("Files visited: {}", self.files_visited);
        info!("Tasks submitted: {}", self.tasks_submitted);

        let timeout = self.opts.batch_timeout(self.tracker.pending_count());
        let deadline = deadline_after(timeout);
        let helper = Arc::clone(self.tracker.helper());
        let pool = Arc::clone(self.tracker.pool());
        let batch = self.tracker.completions();

        let mut retrieved = 0_usize;
        while let Some(drained) = batch.next_or_expire(deadline, CancelReason::Timeout) {
            let recovered = recover(helper.as_ref(), &drained.operand, drained.outcome, timeout);
            match recovered.failure {
                None => self.results.push(recovered.value),
                Some(reason) => self.failures.push(FailedEntry {
                    path: drained.operand,
                    reason,
                    recovered: recovered.value,
                }),
            }
            retrieved += 1;
        }
        info!("Results retrieved: {}", retrieved);

        // A drained tracker takes no more work; a later walk gets a fresh one.
        self.tracker = CompletionTracker::new(pool, helper);
    }

    /// Successful results, in completion order.
    pub fn results(&self) -> &[V] {
        &self.results
    }

    pub fn failures(&self) -> &[FailedEntry<V>] {
        &self.failures
    }

    pub fn files_visited(&self) -> usize {
        self.files_visited
    }

    pub fn tasks_submitted(&self) -> usize {
        self.tasks_submitted
    }

    pub fn start_directory(&self) -> Option<&Path> {
        self.start.as_ref().map(|(dir, _)| dir.as_path())
    }

    pub fn skipped_paths(&self) -> &[(PathBuf, String)] {
        &self.skipped_paths
    }

    /// Units of work submitted but not yet drained.
    pub fn pending_count(&self) -> usize {
        self.tracker.pending_count()
    }

    pub fn matcher(&self) -> &NameMatcher {
        &self.matcher
    }

    pub fn into_report(self) -> DirectoryReport<V> {
        DirectoryReport {
            start_directory: self.start.map(|(dir, _)| dir),
            results: self.results,
            failures: self.failures,
            files_visited: self.files_visited,
            tasks_submitted: self.tasks_submitted,
            skipped_paths: self.skipped_paths,
        }
    }
}
