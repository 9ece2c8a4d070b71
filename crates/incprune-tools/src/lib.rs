//! incprune tools - the external oracles
//!
//! - clang-tidy as the analysis oracle
//! - `cmake --build` as the build oracle
//! - a process runner with captured output and timeouts
//! - toolchain discovery and build-directory checks

pub mod clang_tidy;
pub mod cmake;
pub mod command;
pub mod runner;
pub mod toolchain;

// Re-export key types
pub use clang_tidy::ClangTidy;
pub use cmake::CmakeBuild;
pub use command::{BuiltinTool, ToolCommand};
pub use runner::{RunnerError, ToolOutput, ToolRunner};
pub use toolchain::{ensure_cmake, locate_clang_tidy, sysroot_flags, validate_build_dir};
