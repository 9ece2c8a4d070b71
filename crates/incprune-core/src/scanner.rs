//! Candidate scanning for a single file.
//!
//! The analysis oracle (clang-tidy in production) is invoked through the
//! [`AnalysisOracle`] trait and returns free-form diagnostic text. Only
//! warnings shaped `<path>:<line>:<col>: warning: <message> [<check>]` from
//! the two include checks are turned into candidate line numbers.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ScanError;

/// Check reporting headers that are included but not used directly.
pub const INCLUDE_CLEANER_CHECK: &str = "misc-include-cleaner";

/// Check reporting an include that appears twice.
pub const DUPLICATE_INCLUDE_CHECK: &str = "readability-duplicate-include";

/// Parameters shared by every scan of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanParams {
    /// Analysis tool executable
    pub tool: PathBuf,
    /// Directory holding `compile_commands.json`
    pub compile_db: PathBuf,
    /// Extra compiler flags forwarded to the tool
    pub extra_args: Vec<String>,
    /// Per-invocation timeout in seconds (0 = none)
    pub timeout_secs: u64,
}

/// External static-analysis oracle.
#[async_trait]
pub trait AnalysisOracle: Send + Sync {
    /// Analyze one file and return the raw diagnostic text.
    async fn analyze(&self, file: &Path, params: &ScanParams) -> Result<String, ScanError>;
}

/// Why a line was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnusedInclude,
    DuplicateInclude,
}

/// A diagnostic line relevant to include removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDiagnostic {
    pub path: String,
    pub line: usize,
    pub kind: DiagnosticKind,
}

fn warning_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<path>.+?):(?P<line>\d+):(?P<col>\d+): warning: (?P<msg>.*) \[(?P<check>[\w.,-]+)\]\s*$",
        )
        .expect("warning pattern is valid")
    })
}

fn unused_message_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^included header .* is not used directly$").expect("message pattern is valid")
    })
}

/// Extract include diagnostics from analysis output; everything else is ignored.
pub fn parse_diagnostics(output: &str) -> Vec<IncludeDiagnostic> {
    let mut found = Vec::new();

    for raw in output.lines() {
        let Some(caps) = warning_regex().captures(raw) else {
            continue;
        };
        let Ok(line) = caps["line"].parse::<usize>() else {
            continue;
        };
        let msg = &caps["msg"];
        let kind = match &caps["check"] {
            INCLUDE_CLEANER_CHECK if unused_message_regex().is_match(msg) => {
                DiagnosticKind::UnusedInclude
            }
            DUPLICATE_INCLUDE_CHECK if msg.starts_with("duplicate include") => {
                DiagnosticKind::DuplicateInclude
            }
            _ => continue,
        };
        found.push(IncludeDiagnostic {
            path: caps["path"].to_string(),
            line,
            kind,
        });
    }

    found
}

/// Candidate line numbers in `output` that belong to `file`.
///
/// Diagnostics reported against other files (headers pulled in by `file`)
/// are dropped, matched by file name.
pub fn candidate_lines(file: &Path, output: &str) -> BTreeSet<usize> {
    parse_diagnostics(output)
        .into_iter()
        .filter(|d| refers_to(&d.path, file))
        .map(|d| d.line)
        .collect()
}

fn refers_to(reported: &str, file: &Path) -> bool {
    match (Path::new(reported).file_name(), file.file_name()) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Scan one file. Oracle failures are logged and yield an empty set.
pub async fn scan_file<O>(oracle: &O, file: &Path, params: &ScanParams) -> BTreeSet<usize>
where
    O: AnalysisOracle + ?Sized,
{
    match oracle.analyze(file, params).await {
        Ok(output) => {
            let lines = candidate_lines(file, &output);
            debug!(file = %file.display(), flagged = lines.len(), "scan complete");
            lines
        }
        Err(e) => {
            warn!(file = %file.display(), error = %e, "analysis failed; no candidates for file");
            BTreeSet::new()
        }
    }
}
