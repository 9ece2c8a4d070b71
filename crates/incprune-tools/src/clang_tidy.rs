//! clang-tidy as the analysis oracle.

use std::path::Path;

use async_trait::async_trait;
use incprune_core::{AnalysisOracle, ScanError, ScanParams};
use tracing::{debug, info};

use crate::command::ToolCommand;
use crate::runner::{truncate_output, RunnerError, ToolRunner};

/// Runs clang-tidy with only the include checks enabled.
#[derive(Debug, Clone, Default)]
pub struct ClangTidy {
    /// Echo raw clang-tidy output into the log
    pub verbose: bool,
}

impl ClangTidy {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[async_trait]
impl AnalysisOracle for ClangTidy {
    async fn analyze(&self, file: &Path, params: &ScanParams) -> Result<String, ScanError> {
        let cmd = ToolCommand::clang_tidy(
            &params.tool,
            &params.compile_db,
            &params.extra_args,
            file,
            params.timeout_secs,
        );

        let output = ToolRunner::execute(&cmd).await.map_err(|e| match e {
            RunnerError::Timeout { secs, .. } => ScanError::Timeout(secs),
            other => ScanError::Launch(other.to_string()),
        })?;

        if self.verbose {
            info!(file = %file.display(), "clang-tidy output:\n{}", output.stdout);
        }

        // clang-tidy exits nonzero on compile errors but still prints the
        // warnings it found; only an empty report is a failed scan.
        if !output.passed() {
            if output.stdout.trim().is_empty() {
                return Err(ScanError::NoOutput {
                    exit_code: output.exit_code,
                    stderr: truncate_output(&output.stderr, 800),
                });
            }
            debug!(file = %file.display(), exit_code = output.exit_code, "clang-tidy exited nonzero; using its output");
        }

        Ok(output.stdout)
    }
}
