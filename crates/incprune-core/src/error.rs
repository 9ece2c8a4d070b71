//! Error types for incprune operations.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal and recoverable failures of a prune run.
///
/// Only [`PrunerError::ToolUnavailable`], [`PrunerError::InvalidBuildDir`],
/// [`PrunerError::TargetNotFound`] and [`PrunerError::PreflightBuildFailed`]
/// abort a run. Everything else is recovered locally and logged.
#[derive(Error, Debug)]
pub enum PrunerError {
    /// The analysis tool or the build system cannot be invoked
    #[error("tool unavailable: {tool}: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    /// The build directory is missing or was never configured
    #[error("{0} does not appear to be a valid CMake build directory")]
    InvalidBuildDir(PathBuf),

    /// The path given to the run does not exist
    #[error("path does not exist: {0}")]
    TargetNotFound(PathBuf),

    /// The project does not build before any edit was made
    #[error("initial build failed; fix build errors before running the cleaner")]
    PreflightBuildFailed,

    /// Source discovery failed
    #[error("failed to walk {path}: {reason}")]
    Discovery { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a single analysis-oracle invocation.
///
/// Always recovered by the scanner as an empty candidate set.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to launch analysis tool: {0}")]
    Launch(String),

    #[error("analysis timed out after {0} seconds")]
    Timeout(u64),

    #[error("analysis exited with code {exit_code} and produced no output: {stderr}")]
    NoOutput { exit_code: i32, stderr: String },
}

/// Failures of the file mutator.
///
/// A write either lands completely or not at all, so on any of these the
/// file on disk still holds its previous content.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} was modified outside of incprune during the run")]
    ConcurrentModification(PathBuf),
}

/// Result type for incprune operations
pub type Result<T> = std::result::Result<T, PrunerError>;
