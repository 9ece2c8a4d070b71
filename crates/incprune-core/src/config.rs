//! Run configuration.
//!
//! Defaults come from [`PrunerConfig::default`], can be overridden with
//! `INCPRUNE_*` environment variables via [`PrunerConfig::from_env`], and the
//! CLI applies its flags on top.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Source extensions scanned when the target is a directory.
pub const DEFAULT_EXTENSIONS: &[&str] = &["cc", "cpp"];

/// Default build timeout in seconds (0 disables the timeout).
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 3600;

/// Default per-file analysis timeout in seconds (0 disables the timeout).
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 300;

/// Configuration for one prune run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrunerConfig {
    /// CMake build directory (also holds `compile_commands.json`)
    pub build_dir: PathBuf,
    /// Explicit clang-tidy binary; discovered when `None`
    pub clang_tidy: Option<PathBuf>,
    /// File extensions collected from directory targets
    pub extensions: Vec<String>,
    /// Maximum concurrent clang-tidy invocations
    pub scan_jobs: usize,
    /// Parallelism passed to the build (`-j`)
    pub build_jobs: usize,
    /// Wall-clock limit for one build; exceeding it counts as a failed build
    pub build_timeout_secs: u64,
    /// Wall-clock limit for one clang-tidy invocation
    pub scan_timeout_secs: u64,
    /// List candidates without touching any file or running a build
    pub dry_run: bool,
    /// Show tool output on failures
    pub verbose: bool,
}

impl Default for PrunerConfig {
    fn default() -> Self {
        let jobs = default_parallelism();
        Self {
            build_dir: PathBuf::from("build"),
            clang_tidy: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            scan_jobs: jobs,
            build_jobs: jobs,
            build_timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            dry_run: false,
            verbose: false,
        }
    }
}

impl PrunerConfig {
    /// Defaults overlaid with `INCPRUNE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("INCPRUNE_BUILD_DIR") {
            config.build_dir = PathBuf::from(dir);
        }
        if let Some(tool) = lookup("INCPRUNE_CLANG_TIDY") {
            config.clang_tidy = Some(PathBuf::from(tool));
        }
        if let Some(exts) = lookup("INCPRUNE_EXTENSIONS") {
            config.extensions = parse_extensions(&exts);
        }
        if let Some(n) = parse_number(&lookup, "INCPRUNE_SCAN_JOBS") {
            config.scan_jobs = (n as usize).max(1);
        }
        if let Some(n) = parse_number(&lookup, "INCPRUNE_JOBS") {
            config.build_jobs = (n as usize).max(1);
        }
        if let Some(n) = parse_number(&lookup, "INCPRUNE_BUILD_TIMEOUT") {
            config.build_timeout_secs = n;
        }
        if let Some(n) = parse_number(&lookup, "INCPRUNE_SCAN_TIMEOUT") {
            config.scan_timeout_secs = n;
        }

        config
    }

    /// Whether `ext` (without the dot) is one of the configured extensions.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Split a comma separated extension list, dropping leading dots.
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// `std::thread::available_parallelism`, or 4 when it cannot be determined.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn parse_number<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(variable = key, value = %raw, "ignoring non-numeric value");
            None
        }
    }
}
