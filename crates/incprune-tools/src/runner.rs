//! External tool execution with captured output and timeout.

use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::command::ToolCommand;

/// Why a command produced no exit status.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("{0} has an empty command")]
    EmptyCommand(String),

    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} timed out after {secs} seconds")]
    Timeout { name: String, secs: u64 },

    #[error("failed waiting for {name}: {source}")]
    Wait {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a command that ran to completion.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Command name.
    pub name: String,

    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl ToolOutput {
    /// Whether this command passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// stdout and stderr joined, trimmed, and cut to `max` characters.
    pub fn combined_output(&self, max: usize) -> String {
        let mut combined = String::new();
        if !self.stdout.is_empty() {
            combined.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&self.stderr);
        }
        truncate_output(&combined, max)
    }
}

/// Runs [`ToolCommand`]s.
pub struct ToolRunner;

impl ToolRunner {
    /// Execute a command and capture its output.
    ///
    /// On unix the command leads its own process group. On timeout the whole
    /// group is killed and the command reaped before [`RunnerError::Timeout`]
    /// is returned, so nothing it started outlives this call.
    pub async fn execute(cmd: &ToolCommand) -> Result<ToolOutput, RunnerError> {
        let start = Instant::now();

        let Some((exe, args)) = cmd.command.split_first() else {
            return Err(RunnerError::EmptyCommand(cmd.name.clone()));
        };

        debug!(tool = %cmd.name, command = ?cmd.command, "spawning");
        let mut command = Command::new(exe);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            name: cmd.name.clone(),
            source,
        })?;
        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let collect = async {
            let (status, out, err) =
                tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr));
            Ok::<_, std::io::Error>((status?, out?, err?))
        };

        let waited = if cmd.timeout_secs > 0 {
            let limited = tokio::time::timeout(Duration::from_secs(cmd.timeout_secs), collect).await;
            match limited {
                Ok(waited) => waited,
                Err(_) => {
                    terminate(&mut child, pid).await;
                    warn!(tool = %cmd.name, secs = cmd.timeout_secs, "timed out; killed");
                    return Err(RunnerError::Timeout {
                        name: cmd.name.clone(),
                        secs: cmd.timeout_secs,
                    });
                }
            }
        } else {
            collect.await
        };
        let (status, stdout, stderr) = waited.map_err(|source| RunnerError::Wait {
            name: cmd.name.clone(),
            source,
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = status.code().unwrap_or(-1);

        Ok(ToolOutput {
            name: cmd.name.clone(),
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            duration_ms,
            success: status.success(),
        })
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Kill the command's process group, then the command itself, and reap it.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // SAFETY: plain syscall; `pid` leads the group created at spawn and
        // its id cannot be reused while the group has members.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.kill().await {
        debug!(error = %e, "child already gone");
    }
}

/// Trim `s` and keep at most `max` characters.
pub fn truncate_output(s: &str, max: usize) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        let snippet: String = trimmed.chars().take(max).collect();
        format!("{snippet}\n… (truncated)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: i32, stdout: &str, stderr: &str) -> ToolOutput {
        ToolOutput {
            name: "cmake_build".to_string(),
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration_ms: 100,
            success: exit_code == 0,
        }
    }

    #[test]
    fn test_tool_output_passed() {
        assert!(output(0, "", "").passed());
        assert!(!output(2, "", "error").passed());
    }

    #[test]
    fn test_combined_output_joins_streams() {
        let out = output(1, "[1/2] Building\n", "error: x.h not found\n");
        assert_eq!(out.combined_output(1000), "[1/2] Building\n\nerror: x.h not found");
    }

    #[test]
    fn test_truncate_output_unicode_safe() {
        let out = truncate_output("错误: 失败 😊", 5);
        assert_eq!(out, "错误: 失\n… (truncated)");
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let cmd = ToolCommand::custom("nothing", vec![], 10);
        let err = ToolRunner::execute(&cmd).await.unwrap_err();
        assert!(matches!(err, RunnerError::EmptyCommand(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let cmd = ToolCommand::custom(
            "ghost",
            vec!["incprune-definitely-missing-binary".to_string()],
            10,
        );
        let err = ToolRunner::execute(&cmd).await.unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }
}
