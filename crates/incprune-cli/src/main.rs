//! incprune - remove unused `#include` directives, verified by a real build
//!
//! clang-tidy proposes candidates, then every removal is confirmed by
//! rebuilding the project:
//!
//! 1. all candidates of all files commented out at once, one build
//! 2. per file, all of its remaining candidates, one build each
//! 3. per candidate, one build each
//!
//! A line is deleted only after a passing build with it commented out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};

use incprune_core::config::parse_extensions;
use incprune_core::{PruneSummary, Pruner, PrunerConfig, ScanParams, Tier};
use incprune_tools::{
    ensure_cmake, locate_clang_tidy, sysroot_flags, validate_build_dir, ClangTidy, CmakeBuild,
};

#[derive(Parser, Debug)]
#[command(name = "incprune")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Remove unused #include directives, verified by rebuilding", long_about = None)]
struct Cli {
    /// File or directory to clean
    #[arg(default_value = ".")]
    path: PathBuf,

    /// CMake build directory containing compile_commands.json
    #[arg(short, long)]
    build_dir: Option<PathBuf>,

    /// List candidates without modifying files or building
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Enable verbose output (tool output on failure, debug logs)
    #[arg(short, long)]
    verbose: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json_logs: bool,

    /// Build parallelism passed to `cmake --build -j`
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Maximum concurrent clang-tidy runs
    #[arg(long)]
    scan_jobs: Option<usize>,

    /// Build timeout in seconds (0 = none)
    #[arg(long)]
    build_timeout: Option<u64>,

    /// clang-tidy timeout per file in seconds (0 = none)
    #[arg(long)]
    scan_timeout: Option<u64>,

    /// Path to clang-tidy (discovered when omitted)
    #[arg(long)]
    clang_tidy: Option<PathBuf>,

    /// Comma-separated source extensions scanned in directories
    #[arg(long, value_name = "EXTS")]
    ext: Option<String>,
}

impl Cli {
    /// Lay the flags over `base`.
    fn apply(&self, mut base: PrunerConfig) -> PrunerConfig {
        if let Some(dir) = &self.build_dir {
            base.build_dir = dir.clone();
        }
        if let Some(tool) = &self.clang_tidy {
            base.clang_tidy = Some(tool.clone());
        }
        if let Some(raw) = &self.ext {
            let exts = parse_extensions(raw);
            if !exts.is_empty() {
                base.extensions = exts;
            }
        }
        if let Some(jobs) = self.jobs {
            base.build_jobs = jobs.max(1);
        }
        if let Some(jobs) = self.scan_jobs {
            base.scan_jobs = jobs.max(1);
        }
        if let Some(secs) = self.build_timeout {
            base.build_timeout_secs = secs;
        }
        if let Some(secs) = self.scan_timeout {
            base.scan_timeout_secs = secs;
        }
        base.dry_run |= self.dry_run;
        base.verbose |= self.verbose;
        base
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.apply(PrunerConfig::from_env());

    // Setup logging
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    incprune_core::init_tracing(cli.json_logs, level);

    let summary = cmd_prune(&cli.path, &config).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", render_summary_text(&summary));
    }
    Ok(())
}

/// Validate the toolchain, then run the pipeline.
async fn cmd_prune(target: &Path, config: &PrunerConfig) -> Result<PruneSummary> {
    if !target.exists() {
        anyhow::bail!("Target path does not exist: {}", target.display());
    }

    validate_build_dir(&config.build_dir).with_context(|| {
        format!(
            "{} is not a configured CMake build directory (run cmake first)",
            config.build_dir.display()
        )
    })?;

    let tool = locate_clang_tidy(config.clang_tidy.as_deref())
        .await
        .context("clang-tidy not found; install LLVM or pass --clang-tidy")?;
    info!("Using clang-tidy at {}", tool.display());

    if !config.dry_run {
        ensure_cmake().await.context("cmake is required to verify removals")?;
    }

    let params = ScanParams {
        tool,
        compile_db: config.build_dir.clone(),
        extra_args: sysroot_flags().await,
        timeout_secs: config.scan_timeout_secs,
    };

    let analysis = Arc::new(ClangTidy::new(config.verbose));
    let mut build = CmakeBuild::new(
        &config.build_dir,
        config.build_jobs,
        config.build_timeout_secs,
        config.verbose,
    );

    let summary = Pruner::run(analysis, &mut build, target, config, params)
        .await
        .context("Prune run failed")?;

    if let Some(report) = &summary.report {
        for path in &report.unrestored {
            warn!(file = %path.display(), "file may not match its last verified state");
        }
    }
    Ok(summary)
}

fn render_summary_text(summary: &PruneSummary) -> String {
    let mut lines = Vec::new();

    let Some(report) = &summary.report else {
        for file in &summary.candidates {
            for c in &file.candidates {
                lines.push(format!(
                    "[Dry Run] Would check removal of: {} in {} (Line {})",
                    c.content.trim(),
                    c.path.display(),
                    c.line
                ));
            }
        }
        lines.push(format!(
            "Dry run: {} candidate(s) in {} file(s) out of {} scanned. No files changed.",
            summary.candidate_count(),
            summary.candidates.len(),
            summary.scanned
        ));
        return lines.join("\n");
    };

    for c in report.committed() {
        lines.push(format!("Removed {}", c));
    }
    lines.push(format!(
        "Cleanup complete. Removed {} includes.",
        report.removed()
    ));
    lines.push(format!(
        "  global: {}, per-file: {}, sequential: {}, kept: {}, builds: {}",
        report.removed_at(Tier::Global),
        report.removed_at(Tier::PerFile),
        report.removed_at(Tier::Sequential),
        report.kept(),
        report.verifications
    ));
    if !report.unrestored.is_empty() {
        lines.push("Warning: these files could not be restored to a verified state:".to_string());
        for path in &report.unrestored {
            lines.push(format!("  - {}", path.display()));
        }
    }
    lines.join("\n")
}
