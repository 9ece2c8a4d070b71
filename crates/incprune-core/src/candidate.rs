//! Candidate lines and their per-line mutation state.
//!
//! A [`Candidate`] is an include directive the analysis oracle flagged as
//! removable. Scan results carry bare line numbers; [`select_candidates`]
//! turns them into candidates against the file's current content, dropping
//! anything that is out of range, is not an include, or is already
//! commented out.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One flagged include directive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    /// File the directive lives in
    pub path: PathBuf,
    /// 1-based line number at scan time
    pub line: usize,
    /// Line text without its terminator
    pub content: String,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.path.display(), self.line, self.content.trim())
    }
}

/// All candidates of one file, ascending by line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCandidates {
    pub path: PathBuf,
    pub candidates: Vec<Candidate>,
}

impl FileCandidates {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn lines(&self) -> Vec<usize> {
        self.candidates.iter().map(|c| c.line).collect()
    }
}

/// Per-line mutation state.
///
/// `Original -> CommentedOut -> Deleted` on a passing build,
/// `CommentedOut -> Original` on a failing one. `Deleted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    Original,
    CommentedOut,
    Deleted,
}

/// Verification tier that resolved a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Global,
    PerFile,
    Sequential,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Global => "global",
            Tier::PerFile => "per_file",
            Tier::Sequential => "sequential",
        };
        f.write_str(name)
    }
}

/// Terminal state of a candidate once the engine returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Physically removed after a passing build
    Committed,
    /// Reverted after the build failed without it
    KeptBuildFailed,
    /// No longer an include directive at mutation time
    KeptSkipped,
    /// The file could not be read or written
    KeptIoFailure,
}

impl Resolution {
    pub fn is_committed(&self) -> bool {
        matches!(self, Resolution::Committed)
    }
}

fn include_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#\s*include(_next)?\b").expect("include pattern is valid"))
}

/// Whether the line mentions an include directive anywhere.
pub fn mentions_include(line: &str) -> bool {
    include_regex().is_match(line)
}

/// Whether the line starts with a line or block comment.
pub fn is_comment_prefixed(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with("/*")
}

/// An include directive that is live code, not commented out.
pub fn is_live_include(line: &str) -> bool {
    mentions_include(line) && !is_comment_prefixed(line)
}

/// Strip a trailing `\n` or `\r\n`.
pub fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}

/// Build candidates for `path` from scanned line numbers and file content.
pub fn select_candidates(path: &Path, lines: &BTreeSet<usize>, content: &str) -> FileCandidates {
    let file_lines: Vec<&str> = content.split_inclusive('\n').collect();
    let mut candidates = Vec::new();

    for &line in lines {
        if line == 0 || line > file_lines.len() {
            debug!(file = %path.display(), line, "flagged line is out of range");
            continue;
        }
        let text = strip_terminator(file_lines[line - 1]);
        if !mentions_include(text) {
            debug!(file = %path.display(), line, "flagged line is not an include");
            continue;
        }
        if is_comment_prefixed(text) {
            info!(file = %path.display(), line, "Skipping line (commented): {}", text.trim());
            continue;
        }
        candidates.push(Candidate {
            path: path.to_path_buf(),
            line,
            content: text.to_string(),
        });
    }

    FileCandidates {
        path: path.to_path_buf(),
        candidates,
    }
}
