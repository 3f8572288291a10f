//! Load `.parexec.toml` from a directory (CLI only). The library takes its settings from
//! `ExecutorOpts` directly.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::types::ExecutorOpts;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub struct ParexecToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    /// Matching pattern (`glob:...` or `regex:...`).
    pattern: Option<String>,
    threads: Option<usize>,
    load_multiplier: Option<usize>,
    /// Per-file allowance in milliseconds.
    per_task_timeout_ms: Option<u64>,
    /// Whole-walk cap in seconds.
    max_batch_timeout: Option<u64>,
    /// Shutdown wait in seconds.
    shutdown_timeout: Option<u64>,
    follow_links: Option<bool>,
    verbose: Option<bool>,
}

impl ParexecToml {
    pub fn pattern(&self) -> Option<&str> {
        self.settings.pattern.as_deref()
    }

    pub fn verbose(&self) -> Option<bool> {
        self.settings.verbose
    }
}

/// Load `.parexec.toml` from `dir` if present. Returns None if the file is missing or invalid.
pub fn load_parexec_toml(dir: &Path) -> Option<ParexecToml> {
    let path = dir.join(PackagePaths::get().config_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    parse_parexec_toml(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

pub fn parse_parexec_toml(s: &str) -> Result<ParexecToml, toml::de::Error> {
    toml::from_str(s)
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $sec_field:ident => $opts_field:ident) => {
        if let Some(v) = $sec.$sec_field {
            $opts.$opts_field = v;
        }
    };
    ($sec:expr, $opts:expr, $sec_field:ident => $opts_field:ident, $conv:expr) => {
        if let Some(v) = $sec.$sec_field {
            $opts.$opts_field = ($conv)(v);
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before applying CLI flags.
pub fn apply_file_to_opts(file: &ParexecToml, opts: &mut ExecutorOpts) {
    let sec = &file.settings;
    if let Some(n) = sec.threads {
        opts.num_threads = Some(n);
    }
    apply_file_opt!(sec, opts, load_multiplier => load_multiplier);
    apply_file_opt!(sec, opts, per_task_timeout_ms => per_task_timeout, Duration::from_millis);
    apply_file_opt!(sec, opts, max_batch_timeout => max_batch_timeout, Duration::from_secs);
    apply_file_opt!(sec, opts, shutdown_timeout => shutdown_timeout, Duration::from_secs);
    apply_file_opt!(sec, opts, follow_links => follow_links);
}
