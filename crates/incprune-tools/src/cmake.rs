//! CMake as the build oracle.

use std::path::Path;

use async_trait::async_trait;
use incprune_core::{BuildOracle, Verification};
use tracing::{debug, info, warn};

use crate::command::ToolCommand;
use crate::runner::ToolRunner;

/// Characters of build output shown in the log.
const BUILD_OUTPUT_LIMIT: usize = 4000;

/// Rebuilds a configured CMake build directory.
///
/// Spawn failures and timeouts count as a failed build. Output of a failed
/// build is always logged; with `verbose`, output of passing builds too.
#[derive(Debug, Clone)]
pub struct CmakeBuild {
    command: ToolCommand,
    verbose: bool,
}

impl CmakeBuild {
    /// `cmake --build <build_dir> -j <jobs>` with a timeout (0 = none).
    pub fn new(build_dir: &Path, jobs: usize, timeout_secs: u64, verbose: bool) -> Self {
        Self::from_command(ToolCommand::cmake_build(build_dir, jobs, timeout_secs), verbose)
    }

    /// Use an arbitrary build command.
    pub fn from_command(command: ToolCommand, verbose: bool) -> Self {
        Self { command, verbose }
    }

    pub fn command(&self) -> &ToolCommand {
        &self.command
    }
}

#[async_trait]
impl BuildOracle for CmakeBuild {
    async fn verify(&mut self) -> Verification {
        match ToolRunner::execute(&self.command).await {
            Ok(output) if output.passed() => {
                debug!(tool = %output.name, duration_ms = output.duration_ms, "build passed");
                if self.verbose {
                    info!("build output:\n{}", output.combined_output(BUILD_OUTPUT_LIMIT));
                }
                Verification::Pass
            }
            Ok(output) => {
                warn!(
                    exit_code = output.exit_code,
                    "build failed:\n{}",
                    output.combined_output(BUILD_OUTPUT_LIMIT)
                );
                Verification::Fail
            }
            Err(e) => {
                warn!(error = %e, "build could not complete; treating as failure");
                Verification::Fail
            }
        }
    }
}
