//! Parexec CLI: hash matching files in parallel; use --any to race them for the first digest.

use anyhow::Result;
use clap::Parser;
use parexec::engine::arg_parser::Cli;
use parexec::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
