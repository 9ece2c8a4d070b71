//! Toolchain discovery and build-directory validation.

use std::path::{Path, PathBuf};

use incprune_core::PrunerError;
use tracing::{debug, info, warn};

use crate::command::ToolCommand;
use crate::runner::ToolRunner;

/// Where clang-tidy usually lives when it is not on `PATH`.
pub const CLANG_TIDY_SEARCH_PATHS: &[&str] = &[
    "/usr/local/opt/llvm/bin/clang-tidy",
    "/opt/homebrew/opt/llvm/bin/clang-tidy",
    "/usr/bin/clang-tidy",
    "/usr/local/bin/clang-tidy",
];

/// Whether `<program> --version` runs and exits 0.
pub async fn probe(program: impl Into<PathBuf>) -> bool {
    let cmd = ToolCommand::version_probe(program);
    ToolRunner::execute(&cmd)
        .await
        .map(|o| o.passed())
        .unwrap_or(false)
}

/// Find a usable clang-tidy.
///
/// An explicit path must work; otherwise `PATH` is tried, then
/// [`CLANG_TIDY_SEARCH_PATHS`].
pub async fn locate_clang_tidy(explicit: Option<&Path>) -> Result<PathBuf, PrunerError> {
    if let Some(path) = explicit {
        if probe(path).await {
            return Ok(path.to_path_buf());
        }
        return Err(PrunerError::ToolUnavailable {
            tool: path.display().to_string(),
            reason: "configured clang-tidy does not run".to_string(),
        });
    }

    if probe("clang-tidy").await {
        return Ok(PathBuf::from("clang-tidy"));
    }

    CLANG_TIDY_SEARCH_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| PrunerError::ToolUnavailable {
            tool: "clang-tidy".to_string(),
            reason: "not found on PATH or in common LLVM locations".to_string(),
        })
}

/// Fail unless `cmake --version` runs.
pub async fn ensure_cmake() -> Result<(), PrunerError> {
    if probe("cmake").await {
        Ok(())
    } else {
        Err(PrunerError::ToolUnavailable {
            tool: "cmake".to_string(),
            reason: "`cmake --version` failed".to_string(),
        })
    }
}

/// Check that `build_dir` is a configured CMake build directory.
///
/// A missing `compile_commands.json` is only warned about.
pub fn validate_build_dir(build_dir: &Path) -> Result<(), PrunerError> {
    if !build_dir.join("CMakeCache.txt").is_file() {
        return Err(PrunerError::InvalidBuildDir(build_dir.to_path_buf()));
    }
    if !build_dir.join("compile_commands.json").is_file() {
        warn!(
            build_dir = %build_dir.display(),
            "compile_commands.json not found; configure with -DCMAKE_EXPORT_COMPILE_COMMANDS=ON"
        );
    }
    Ok(())
}

/// `-isysroot <sdk>` on macOS when the SDK can be found, empty elsewhere.
pub async fn sysroot_flags() -> Vec<String> {
    if !cfg!(target_os = "macos") {
        return Vec::new();
    }

    let cmd = ToolCommand::custom(
        "xcrun_sdk_path",
        vec!["xcrun".to_string(), "--show-sdk-path".to_string()],
        30,
    );
    match ToolRunner::execute(&cmd).await {
        Ok(output) if output.passed() => {
            let sdk = output.stdout.trim().to_string();
            if !sdk.is_empty() && Path::new(&sdk).exists() {
                info!("Detected macOS SDK at {}", sdk);
                return vec!["-isysroot".to_string(), sdk];
            }
            debug!(sdk = %sdk, "xcrun returned an unusable SDK path");
        }
        Ok(output) => warn!(exit_code = output.exit_code, "Failed to detect macOS SDK"),
        Err(e) => warn!(error = %e, "Failed to detect macOS SDK"),
    }
    Vec::new()
}
