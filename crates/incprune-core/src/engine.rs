//! Tiered verification engine.
//!
//! Turns the filtered candidates of every file into committed deletions,
//! escalating through three tiers:
//!
//! 1. **Global**: comment out everything, one build.
//! 2. **Per file**: for each file with two or more remaining candidates,
//!    comment out that file's candidates, one build per file.
//! 3. **Sequential**: one candidate at a time, one build each.
//!
//! A failed build reverts exactly the batch that produced it. Between
//! batches every file on disk holds content that last passed the build, or
//! is untouched. Only one unverified batch exists at any time.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::candidate::{Candidate, FileCandidates, Resolution, Tier};
use crate::error::{MutationError, PrunerError, Result};
use crate::mutator::{FileMutator, FileSnapshot};
use crate::oracle::{BuildOracle, Verification};

/// Result of one batch within a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The batch built; this many lines were removed
    Committed(usize),
    /// The batch could not be verified; try a finer tier
    Escalate,
}

/// Terminal state of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateOutcome {
    pub candidate: Candidate,
    pub resolution: Resolution,
    /// Tier that resolved it; `None` if the file could not even be opened
    pub tier: Option<Tier>,
}

/// Everything the engine did during one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineReport {
    pub outcomes: Vec<CandidateOutcome>,
    /// Builds run after the pre-flight build
    pub verifications: usize,
    /// Files whose last good content could not be restored
    pub unrestored: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl EngineReport {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            outcomes: Vec::new(),
            verifications: 0,
            unrestored: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Number of include lines physically removed.
    pub fn removed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.resolution.is_committed())
            .count()
    }

    /// Candidates left in place.
    pub fn kept(&self) -> usize {
        self.outcomes.len() - self.removed()
    }

    /// Committed candidates, in file then line order.
    pub fn committed(&self) -> Vec<&Candidate> {
        self.outcomes
            .iter()
            .filter(|o| o.resolution.is_committed())
            .map(|o| &o.candidate)
            .collect()
    }

    /// Removed lines resolved at `tier`.
    pub fn removed_at(&self, tier: Tier) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.resolution.is_committed() && o.tier == Some(tier))
            .count()
    }
}

/// One file's mutator and its unresolved candidates.
struct FileWork {
    mutator: FileMutator,
    candidates: Vec<Candidate>,
    remaining: Vec<usize>,
}

impl FileWork {
    fn resolve(&mut self, lines: &[usize], resolution: Resolution, tier: Tier, report: &mut EngineReport) {
        let taken: Vec<usize> = lines.iter().copied().filter(|&l| self.withdraw(l)).collect();
        self.record(&taken, resolution, tier, report);
    }

    fn resolve_rest(&mut self, resolution: Resolution, tier: Tier, report: &mut EngineReport) {
        let rest = self.remaining.clone();
        self.resolve(&rest, resolution, tier, report);
    }

    /// Take `line` out of the unresolved set without recording an outcome.
    fn withdraw(&mut self, line: usize) -> bool {
        match self.remaining.iter().position(|&l| l == line) {
            Some(pos) => {
                self.remaining.remove(pos);
                true
            }
            None => false,
        }
    }

    fn record(&self, lines: &[usize], resolution: Resolution, tier: Tier, report: &mut EngineReport) {
        for &line in lines {
            if let Some(candidate) = self.candidates.iter().find(|c| c.line == line) {
                report.outcomes.push(CandidateOutcome {
                    candidate: candidate.clone(),
                    resolution,
                    tier: Some(tier),
                });
            }
        }
    }
}

/// Drives the tiers against a borrowed build oracle.
pub struct VerificationEngine<'o, B: BuildOracle + ?Sized> {
    oracle: &'o mut B,
    preflight_passed: bool,
    poisoned: bool,
    verifications: usize,
}

impl<'o, B: BuildOracle + ?Sized> VerificationEngine<'o, B> {
    pub fn new(oracle: &'o mut B) -> Self {
        Self {
            oracle,
            preflight_passed: false,
            poisoned: false,
            verifications: 0,
        }
    }

    /// Build the untouched project. Nothing is mutated unless this passes.
    pub async fn preflight(&mut self) -> Result<()> {
        info!("Verifying initial build state...");
        if !self.oracle.verify().await.passed() {
            return Err(PrunerError::PreflightBuildFailed);
        }
        info!("Initial build passed.");
        self.preflight_passed = true;
        Ok(())
    }

    /// Run all tiers over `plan` and report every candidate's outcome.
    ///
    /// Runs the pre-flight build first if it has not passed yet.
    #[instrument(skip_all, fields(files = plan.len()))]
    pub async fn run(&mut self, plan: Vec<FileCandidates>) -> Result<EngineReport> {
        if !self.preflight_passed {
            self.preflight().await?;
        }

        let mut report = EngineReport::new();
        let mut works = Vec::new();

        for file in plan.into_iter().filter(|f| !f.is_empty()) {
            match FileMutator::open(&file.path) {
                Ok(mutator) => works.push(FileWork {
                    mutator,
                    remaining: file.lines(),
                    candidates: file.candidates,
                }),
                Err(e) => {
                    warn!(file = %file.path.display(), error = %e, "cannot open file; keeping its candidates");
                    report.outcomes.extend(file.candidates.into_iter().map(|candidate| {
                        CandidateOutcome {
                            candidate,
                            resolution: Resolution::KeptIoFailure,
                            tier: None,
                        }
                    }));
                }
            }
        }

        let total: usize = works.iter().map(|w| w.remaining.len()).sum();
        if total > 0 {
            info!(candidates = total, files = works.len(), "Verifying candidates");
            if let BatchOutcome::Committed(removed) = self.global_batch(&mut works, &mut report).await {
                debug!(removed, "global batch settled every file");
            }

            for work in works.iter_mut().filter(|w| !w.remaining.is_empty()) {
                if work.remaining.len() >= 2 {
                    if let BatchOutcome::Committed(removed) = self.file_batch(work, &mut report).await {
                        debug!(file = %work.mutator.path().display(), removed, "file batch committed");
                        continue;
                    }
                }
                if !work.remaining.is_empty() {
                    let removed = self.sequential(work, &mut report).await;
                    debug!(file = %work.mutator.path().display(), removed, "sequential tier finished");
                }
            }
        }

        report.outcomes.sort_by(|a, b| {
            (&a.candidate.path, a.candidate.line).cmp(&(&b.candidate.path, b.candidate.line))
        });
        report.verifications = self.verifications;
        report.finished_at = Utc::now();
        info!(
            removed = report.removed(),
            kept = report.kept(),
            verifications = report.verifications,
            "Verification finished"
        );
        Ok(report)
    }

    async fn verify(&mut self, tier: Tier) -> Verification {
        self.verifications += 1;
        let verdict = self.oracle.verify().await;
        info!(%tier, build = self.verifications, passed = verdict.passed(), "Build {}", if verdict.passed() { "PASS" } else { "FAIL" });
        verdict
    }

    /// Tier 1: every candidate of every file in one build.
    async fn global_batch(&mut self, works: &mut [FileWork], report: &mut EngineReport) -> BatchOutcome {
        let mut applied: Vec<(usize, FileSnapshot)> = Vec::new();
        let mut clean = true;

        for (idx, work) in works.iter_mut().enumerate() {
            if work.remaining.is_empty() {
                continue;
            }
            let snapshot = work.mutator.snapshot();
            match work.mutator.comment(&work.remaining) {
                Ok(lines) => {
                    let complete = lines.len() == work.remaining.len();
                    applied.push((idx, snapshot));
                    if !complete {
                        clean = false;
                        break;
                    }
                }
                Err(e) => {
                    fail_file(work, Tier::Global, &e, report);
                    clean = false;
                    break;
                }
            }
        }

        // A batch that did not apply cleanly is not worth a build; let the
        // finer tiers start over from each file's current content.
        if !clean {
            warn!("global batch could not be applied cleanly; falling back to per-file verification");
            self.revert_all(works, applied, Tier::Global, report);
            return BatchOutcome::Escalate;
        }
        if applied.is_empty() {
            return BatchOutcome::Escalate;
        }

        if !self.verify(Tier::Global).await.passed() {
            info!("global batch failed; reverting all files");
            self.revert_all(works, applied, Tier::Global, report);
            return BatchOutcome::Escalate;
        }

        let mut removed = 0;
        for (idx, snapshot) in applied {
            let work = &mut works[idx];
            match work.mutator.delete() {
                Ok(lines) => {
                    removed += lines.len();
                    work.resolve(&lines, Resolution::Committed, Tier::Global, report);
                }
                Err(e) => {
                    self.restore(work, &snapshot, Tier::Global, report);
                    fail_file(work, Tier::Global, &e, report);
                }
            }
        }
        info!(removed, "global batch committed");
        BatchOutcome::Committed(removed)
    }

    /// Tier 2: all remaining candidates of one file in one build.
    async fn file_batch(&mut self, work: &mut FileWork, report: &mut EngineReport) -> BatchOutcome {
        if self.poisoned {
            work.resolve_rest(Resolution::KeptIoFailure, Tier::PerFile, report);
            return BatchOutcome::Escalate;
        }

        let snapshot = work.mutator.snapshot();
        let batch = work.remaining.clone();
        let applied = match work.mutator.comment(&batch) {
            Ok(lines) => lines,
            Err(e) => {
                fail_file(work, Tier::PerFile, &e, report);
                return BatchOutcome::Escalate;
            }
        };
        let skipped: Vec<usize> = batch.into_iter().filter(|l| !applied.contains(l)).collect();
        work.resolve(&skipped, Resolution::KeptSkipped, Tier::PerFile, report);
        if applied.is_empty() {
            return BatchOutcome::Escalate;
        }

        info!(file = %work.mutator.path().display(), candidates = applied.len(), "Verifying file batch");
        if !self.verify(Tier::PerFile).await.passed() {
            self.restore(work, &snapshot, Tier::PerFile, report);
            return BatchOutcome::Escalate;
        }

        match work.mutator.delete() {
            Ok(lines) => {
                work.resolve(&lines, Resolution::Committed, Tier::PerFile, report);
                BatchOutcome::Committed(lines.len())
            }
            Err(e) => {
                self.restore(work, &snapshot, Tier::PerFile, report);
                fail_file(work, Tier::PerFile, &e, report);
                BatchOutcome::Escalate
            }
        }
    }

    /// Tier 3: one candidate per build; confirmed lines accumulate and are
    /// removed by one final rewrite. A confirmed line counts as committed
    /// only once it is gone from the file on disk.
    async fn sequential(&mut self, work: &mut FileWork, report: &mut EngineReport) -> usize {
        let mut confirmed = Vec::new();

        for line in work.remaining.clone() {
            if self.poisoned {
                work.resolve_rest(Resolution::KeptIoFailure, Tier::Sequential, report);
                break;
            }

            let applied = match work.mutator.comment(&[line]) {
                Ok(lines) => lines,
                Err(e) => {
                    fail_file(work, Tier::Sequential, &e, report);
                    break;
                }
            };
            if applied.is_empty() {
                work.resolve(&[line], Resolution::KeptSkipped, Tier::Sequential, report);
                continue;
            }

            info!(file = %work.mutator.path().display(), line, "Checking candidate");
            if self.verify(Tier::Sequential).await.passed() {
                work.mutator.confirm();
                work.withdraw(line);
                confirmed.push(line);
                continue;
            }

            match work.mutator.rollback() {
                Ok(_) => work.resolve(&[line], Resolution::KeptBuildFailed, Tier::Sequential, report),
                Err(e) => {
                    error!(file = %work.mutator.path().display(), line, error = %e, "failed to restore line after a failed build");
                    self.poison(work, report);
                    fail_file(work, Tier::Sequential, &e, report);
                    break;
                }
            }
        }

        if confirmed.is_empty() {
            return 0;
        }
        if work.mutator.has_unwritten_changes() {
            if let Err(e) = work.mutator.flush() {
                error!(file = %work.mutator.path().display(), error = %e, "failed to write final removals; confirmed lines remain commented out");
                if !report.unrestored.iter().any(|p| p == work.mutator.path()) {
                    report.unrestored.push(work.mutator.path().to_path_buf());
                }
            }
        }

        let on_disk = work.mutator.removed_on_disk();
        let (removed, stuck): (Vec<usize>, Vec<usize>) =
            confirmed.into_iter().partition(|l| on_disk.contains(l));
        work.record(&removed, Resolution::Committed, Tier::Sequential, report);
        work.record(&stuck, Resolution::KeptIoFailure, Tier::Sequential, report);
        removed.len()
    }

    fn revert_all(
        &mut self,
        works: &mut [FileWork],
        applied: Vec<(usize, FileSnapshot)>,
        tier: Tier,
        report: &mut EngineReport,
    ) {
        for (idx, snapshot) in applied {
            self.restore(&mut works[idx], &snapshot, tier, report);
        }
    }

    /// Put a file back to `snapshot`; on failure poison the run.
    fn restore(&mut self, work: &mut FileWork, snapshot: &FileSnapshot, tier: Tier, report: &mut EngineReport) {
        if let Err(e) = work.mutator.revert(snapshot) {
            error!(file = %work.mutator.path().display(), error = %e, "failed to revert file to its last verified content");
            self.poison(work, report);
            fail_file(work, tier, &e, report);
        }
    }

    /// A file stuck in an unverified state makes every later build meaningless.
    fn poison(&mut self, work: &FileWork, report: &mut EngineReport) {
        self.poisoned = true;
        report.unrestored.push(work.mutator.path().to_path_buf());
    }
}

fn fail_file(work: &mut FileWork, tier: Tier, err: &MutationError, report: &mut EngineReport) {
    warn!(file = %work.mutator.path().display(), %tier, error = %err, "keeping remaining candidates of file");
    work.resolve_rest(Resolution::KeptIoFailure, tier, report);
}
