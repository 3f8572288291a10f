//! CLI command handler: hash every matching file by default; --any races them for one digest.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::arg_parser::Cli;
use crate::engine::executor::TaskExecutor;
use crate::engine::hashing::{FileDigest, HashHelper};
use crate::engine::pool::WorkerPool;
use crate::pipeline::{NameMatcher, WalkEvent, walk_events};
use crate::scan::scan_dir;
use crate::types::ExecutorOpts;
use crate::utils::{apply_file_to_opts, load_parexec_toml, setup_logging};

/// File settings first, CLI flags on top. Returns the options and the pattern to match.
fn setup_opts(cli: &Cli) -> Result<(ExecutorOpts, String)> {
    let file = load_parexec_toml(&cli.dir).unwrap_or_default();
    setup_logging(cli.verbose || file.verbose().unwrap_or(false));

    let mut opts = ExecutorOpts::default();
    apply_file_to_opts(&file, &mut opts);
    if cli.threads.is_some() {
        opts.num_threads = cli.threads;
    }
    if let Some(secs) = cli.timeout {
        opts.max_batch_timeout = Duration::from_secs(secs);
    }
    opts.follow_links |= cli.follow_links;

    let pattern = cli
        .pattern
        .clone()
        .or_else(|| file.pattern().map(str::to_string))
        .context("no pattern given; pass -p glob:... or set `pattern` in .parexec.toml")?;
    debug!("{} CONFIG: {:#?}", env!("CARGO_PKG_NAME").to_uppercase(), opts);
    Ok((opts, pattern))
}

/// Run a full hash (default) or a race for the first digest (`--any`).
pub fn handle_run(cli: &Cli) -> Result<()> {
    let (opts, pattern) = setup_opts(cli)?;
    let pool = Arc::new(WorkerPool::from_opts(&opts)?);
    if cli.any {
        handle_any(cli, &pattern, pool, opts)
    } else {
        handle_all(cli, &pattern, pool, opts)
    }
}

fn handle_all(cli: &Cli, pattern: &str, pool: Arc<WorkerPool>, opts: ExecutorOpts) -> Result<()> {
    let shutdown_timeout = opts.shutdown_timeout;
    let report = scan_dir(&cli.dir, pattern, Arc::new(HashHelper), Arc::clone(&pool), &opts)?;
    for digest in report.results.iter().flatten() {
        println!("{digest}");
    }
    for failed in &report.failures {
        eprintln!("failed: {} ({:?})", failed.path.display(), failed.reason);
    }
    if !report.skipped_paths.is_empty() {
        warn!(
            "Skipped {} paths due to permission errors or access issues",
            report.skipped_paths.len()
        );
    }
    info!(
        "Hashed {} of {} matching files ({} visited)",
        report.results.len(),
        report.tasks_submitted,
        report.files_visited
    );
    pool.shutdown(shutdown_timeout);
    Ok(())
}

fn handle_any(cli: &Cli, pattern: &str, pool: Arc<WorkerPool>, opts: ExecutorOpts) -> Result<()> {
    let matcher = NameMatcher::new(pattern)?;
    let files: Vec<PathBuf> = walk_events(&cli.dir, opts.follow_links)
        .filter_map(|event| match event {
            WalkEvent::File(path) if matcher.matches(&path) => Some(path),
            WalkEvent::Err { msg, path } => {
                warn!("File visit failed: {:?}: {}", path, msg);
                None
            }
            _ => None,
        })
        .collect();
    if files.is_empty() {
        info!("No files match {}", matcher.as_str());
        return Ok(());
    }

    let mut executor = TaskExecutor::<PathBuf>::with_pool(pool, opts);
    let first: Option<FileDigest> = executor.execute_any(&files, &HashHelper)?;
    match first {
        Some(digest) => println!("{digest}"),
        None => warn!("None of the {} matching files could be hashed", files.len()),
    }
    executor.stop();
    Ok(())
}
