//! incprune core library
//!
//! Build-verified removal of unused `#include` directives:
//! - scan files for candidate lines through an analysis oracle, in parallel
//! - comment candidates out in escalating batches (global, per file, single)
//! - keep an edit only when the project still builds, revert otherwise

pub mod candidate;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod mutator;
pub mod oracle;
pub mod pipeline;
pub mod scanner;
pub mod telemetry;

pub use candidate::{Candidate, FileCandidates, MutationState, Resolution, Tier};
pub use config::PrunerConfig;
pub use coordinator::{scan_all, ScanResult};
pub use discovery::collect_sources;
pub use engine::{BatchOutcome, CandidateOutcome, EngineReport, VerificationEngine};
pub use error::{MutationError, PrunerError, Result, ScanError};
pub use mutator::{FileMutator, FileSnapshot};
pub use oracle::{BuildOracle, Verification};
pub use pipeline::{PruneSummary, Pruner};
pub use scanner::{scan_file, AnalysisOracle, ScanParams};
pub use telemetry::init_tracing;
