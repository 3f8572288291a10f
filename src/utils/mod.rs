pub mod config;
pub mod fd_limit;
pub mod logger;
pub mod parexec_toml;

pub use config::*;
pub use fd_limit::{FDS_PER_WORKER, max_pool_size_by_fd_limit, pool_cap_for, soft_nofile_limit};
pub use logger::setup_logging;
pub use parexec_toml::{ParexecToml, apply_file_to_opts, load_parexec_toml, parse_parexec_toml};
