//! External tool command definitions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Checks clang-tidy runs; everything else is disabled.
pub const CLANG_TIDY_CHECKS: &str = "-checks=-*,misc-include-cleaner,readability-duplicate-include";

/// Builtin tool invocations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinTool {
    /// cmake --build <dir> -j <N>
    CmakeBuild,

    /// clang-tidy -p <dir> -checks=... --quiet <file>
    ClangTidy,
}

impl BuiltinTool {
    /// Get the tool name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinTool::CmakeBuild => "cmake_build",
            BuiltinTool::ClangTidy => "clang_tidy",
        }
    }
}

/// A fully resolved command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCommand {
    /// Human-readable name used in logs.
    pub name: String,

    /// Command to execute (first element is the executable).
    pub command: Vec<String>,

    /// Timeout in seconds (0 = no timeout).
    pub timeout_secs: u64,
}

impl ToolCommand {
    /// Create a custom command.
    pub fn custom(name: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            command,
            timeout_secs,
        }
    }

    /// `cmake --build <build_dir> -j <jobs>`.
    pub fn cmake_build(build_dir: &Path, jobs: usize, timeout_secs: u64) -> Self {
        Self {
            name: BuiltinTool::CmakeBuild.name().to_string(),
            command: vec![
                "cmake".to_string(),
                "--build".to_string(),
                build_dir.to_string_lossy().to_string(),
                "-j".to_string(),
                jobs.max(1).to_string(),
            ],
            timeout_secs,
        }
    }

    /// clang-tidy over one file with only the include checks enabled.
    pub fn clang_tidy(
        tool: &Path,
        compile_db: &Path,
        extra_args: &[String],
        file: &Path,
        timeout_secs: u64,
    ) -> Self {
        let mut command = vec![
            tool.to_string_lossy().to_string(),
            "-p".to_string(),
            compile_db.to_string_lossy().to_string(),
            CLANG_TIDY_CHECKS.to_string(),
            "--quiet".to_string(),
        ];
        command.extend(extra_args.iter().map(|a| format!("-extra-arg={a}")));
        command.push(file.to_string_lossy().to_string());

        Self {
            name: BuiltinTool::ClangTidy.name().to_string(),
            command,
            timeout_secs,
        }
    }

    /// `<program> --version`, used to probe availability.
    pub fn version_probe(program: impl Into<PathBuf>) -> Self {
        let program: PathBuf = program.into();
        Self {
            name: format!("{}_version", program.display()),
            command: vec![program.to_string_lossy().to_string(), "--version".to_string()],
            timeout_secs: 30,
        }
    }

    /// The executable.
    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }
}
