//! In-process fakes for the analysis and build oracles (testing only)
//!
//! `FlaggingAnalysis` emits clang-tidy shaped warnings for configured lines,
//! and `RequiredLinesBuild` "builds" by checking that certain lines are still
//! present and live in files on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::candidate::is_comment_prefixed;
use crate::error::ScanError;
use crate::oracle::{BuildOracle, Verification};
use crate::scanner::{AnalysisOracle, ScanParams};

// ---------------------------------------------------------------------------
// FlaggingAnalysis
// ---------------------------------------------------------------------------

/// Analysis oracle that flags fixed line numbers per file.
#[derive(Debug, Default, Clone)]
pub struct FlaggingAnalysis {
    flagged: HashMap<PathBuf, Vec<usize>>,
    failing: Vec<PathBuf>,
}

impl FlaggingAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `lines` of `path` as unused includes.
    pub fn flag(mut self, path: impl AsRef<Path>, lines: &[usize]) -> Self {
        self.flagged
            .entry(path.as_ref().to_path_buf())
            .or_default()
            .extend_from_slice(lines);
        self
    }

    /// Make analysis of `path` fail.
    pub fn fail(mut self, path: impl AsRef<Path>) -> Self {
        self.failing.push(path.as_ref().to_path_buf());
        self
    }
}

#[async_trait]
impl AnalysisOracle for FlaggingAnalysis {
    async fn analyze(&self, file: &Path, _params: &ScanParams) -> Result<String, ScanError> {
        if self.failing.iter().any(|p| p == file) {
            return Err(ScanError::Launch(format!("no analysis for {}", file.display())));
        }
        let lines = self.flagged.get(file).cloned().unwrap_or_default();
        Ok(lines
            .iter()
            .map(|line| {
                format!(
                    "{}:{}:1: warning: included header fake.h is not used directly [misc-include-cleaner]\n",
                    file.display(),
                    line
                )
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// RequiredLinesBuild
// ---------------------------------------------------------------------------

/// Build oracle that passes while every required line is present, uncommented.
#[derive(Debug, Default, Clone)]
pub struct RequiredLinesBuild {
    required: Vec<(PathBuf, String)>,
    builds: usize,
    fail_all: bool,
}

impl RequiredLinesBuild {
    pub fn new() -> Self {
        Self::default()
    }

    /// The build breaks unless `path` holds a live line equal to `line` (trimmed).
    pub fn require(mut self, path: impl AsRef<Path>, line: &str) -> Self {
        self.required
            .push((path.as_ref().to_path_buf(), line.trim().to_string()));
        self
    }

    /// Every build fails, including the pre-flight one.
    pub fn broken() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Builds run so far, pre-flight included.
    pub fn builds(&self) -> usize {
        self.builds
    }

    /// Evaluate the current files without counting a build.
    pub fn check(&self) -> bool {
        if self.fail_all {
            return false;
        }
        self.required.iter().all(|(path, needle)| {
            std::fs::read_to_string(path)
                .map(|content| {
                    content
                        .lines()
                        .any(|l| l.trim() == needle && !is_comment_prefixed(l))
                })
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl BuildOracle for RequiredLinesBuild {
    async fn verify(&mut self) -> Verification {
        self.builds += 1;
        Verification::from(self.check())
    }
}
