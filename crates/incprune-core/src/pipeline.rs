//! End-to-end prune run: discover, pre-flight, scan, filter, verify.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::candidate::{select_candidates, FileCandidates};
use crate::config::PrunerConfig;
use crate::coordinator::{scan_all, ScanResult};
use crate::discovery::collect_sources;
use crate::engine::{EngineReport, VerificationEngine};
use crate::error::Result;
use crate::oracle::BuildOracle;
use crate::scanner::{AnalysisOracle, ScanParams};

/// What a prune run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneSummary {
    pub target: PathBuf,
    /// Files scanned
    pub scanned: usize,
    /// Filtered candidates per file (files without candidates omitted)
    pub candidates: Vec<FileCandidates>,
    /// Engine outcome; `None` in dry-run mode
    pub report: Option<EngineReport>,
}

impl PruneSummary {
    pub fn candidate_count(&self) -> usize {
        self.candidates.iter().map(FileCandidates::len).sum()
    }

    pub fn removed(&self) -> usize {
        self.report.as_ref().map(EngineReport::removed).unwrap_or(0)
    }

    pub fn is_dry_run(&self) -> bool {
        self.report.is_none()
    }
}

/// Prune orchestrator.
pub struct Pruner;

impl Pruner {
    /// Run the whole pipeline against `target`.
    ///
    /// Outside dry-run mode the pre-flight build runs before any scan, so an
    /// unbuildable project fails fast. In dry-run mode no build runs and no
    /// file is touched.
    pub async fn run<A, B>(
        analysis: Arc<A>,
        build: &mut B,
        target: &Path,
        config: &PrunerConfig,
        params: ScanParams,
    ) -> Result<PruneSummary>
    where
        A: AnalysisOracle + ?Sized + 'static,
        B: BuildOracle + ?Sized,
    {
        let files = collect_sources(target, config)?;
        info!(target = %target.display(), files = files.len(), "Collected sources");

        let mut engine = VerificationEngine::new(build);
        if !config.dry_run {
            engine.preflight().await?;
        }

        let scanned = files.len();
        let results = scan_all(analysis, files, Arc::new(params), config.scan_jobs).await;
        let candidates = filter_results(results);

        let report = if config.dry_run {
            None
        } else {
            Some(engine.run(candidates.clone()).await?)
        };

        Ok(PruneSummary {
            target: target.to_path_buf(),
            scanned,
            candidates,
            report,
        })
    }
}

/// Turn raw scan results into candidates against current file content.
///
/// A file that cannot be read contributes nothing.
pub fn filter_results(results: Vec<ScanResult>) -> Vec<FileCandidates> {
    results
        .into_iter()
        .filter(|r| !r.lines.is_empty())
        .filter_map(|r| match std::fs::read_to_string(&r.path) {
            Ok(content) => Some(select_candidates(&r.path, &r.lines, &content)),
            Err(e) => {
                warn!(file = %r.path.display(), error = %e, "Could not read file");
                None
            }
        })
        .filter(|f| !f.is_empty())
        .collect()
}
