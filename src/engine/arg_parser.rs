use clap::Parser;
use std::path::PathBuf;

struct DefaultArgs;

impl DefaultArgs {
    pub const DIR: &'static str = ".";
}

/// Hash every file matching a name pattern, in parallel.
#[derive(Clone, Parser)]
#[command(name = "parexec")]
#[command(about = "Hash matching files in parallel; use --any to stop at the first result.")]
pub struct Cli {
    /// Directory to walk. Default: current directory.
    #[arg(value_name = "DIR", default_value = DefaultArgs::DIR)]
    pub dir: PathBuf,

    /// File name pattern, `glob:PATTERN` or `regex:PATTERN`. Falls back to `.parexec.toml`.
    #[arg(long, short = 'p')]
    pub pattern: Option<String>,

    /// Worker threads. Default: available cores times the load multiplier.
    #[arg(long, short = 't')]
    pub threads: Option<usize>,

    /// Cap on the whole run, in seconds.
    #[arg(long, value_parser = clap::value_parser!(u64))]
    pub timeout: Option<u64>,

    /// Follow symbolic links.
    #[arg(long, short = 'f')]
    pub follow_links: bool,

    /// Verbose output.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Race the matching files and print only the first digest.
    #[arg(long)]
    pub any: bool,
}
