//! Running external tools
//!
//! Every tool invocation gets its own log file under the log directory; the
//! tool's stderr (and stdout, unless the caller consumes it) goes there. On
//! failure the log is kept and its path is carried by `StewardError::Tool`,
//! on success it is removed.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::Utc;
use tracing::{debug, warn};

use super::accounts::ServiceAccount;
use crate::error::{StewardError, StewardResult};

/// Runs commands with output captured to per-invocation log files
#[derive(Debug, Clone)]
pub struct ToolRunner {
    log_dir: PathBuf,
}

impl ToolRunner {
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    fn open_log(&self, tool: &str) -> StewardResult<(PathBuf, File)> {
        fs::create_dir_all(&self.log_dir)?;
        let name = format!(
            "{}-{}.log",
            Utc::now().format("%Y%m%d-%H%M%S-%3f"),
            tool.replace(['/', ' '], "_")
        );
        let path = self.log_dir.join(name);
        let file = File::create(&path).map_err(|e| {
            StewardError::Io(format!("Failed to create log {}: {}", path.display(), e))
        })?;
        Ok((path, file))
    }

    fn spawn_error(tool: &str, err: io::Error) -> StewardError {
        if err.kind() == io::ErrorKind::NotFound {
            StewardError::Precondition(format!("{} is not installed or not on PATH", tool))
        } else {
            StewardError::Io(format!("Failed to start {}: {}", tool, err))
        }
    }

    fn finish(tool: &str, status: std::process::ExitStatus, log: PathBuf) -> StewardResult<()> {
        if status.success() {
            debug!(tool, "completed");
            if let Err(e) = fs::remove_file(&log) {
                warn!(tool, log = %log.display(), "Failed to remove tool log: {}", e);
            }
            Ok(())
        } else {
            warn!(tool, %status, log = %log.display(), "tool failed");
            Err(StewardError::tool(tool, status, log))
        }
    }

    /// Run a command to completion
    pub fn run(&self, tool: &str, cmd: &mut Command) -> StewardResult<()> {
        let (log, file) = self.open_log(tool)?;
        debug!(tool, command = ?cmd, "running");

        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::from(file.try_clone()?))
            .stderr(Stdio::from(file))
            .status()
            .map_err(|e| Self::spawn_error(tool, e))?;

        Self::finish(tool, status, log)
    }

    /// Run a command feeding `input` to its stdin
    pub fn run_with_input(
        &self,
        tool: &str,
        cmd: &mut Command,
        input: &mut dyn Read,
    ) -> StewardResult<()> {
        let (log, file) = self.open_log(tool)?;
        debug!(tool, command = ?cmd, "running with input");

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::from(file.try_clone()?))
            .stderr(Stdio::from(file))
            .spawn()
            .map_err(|e| Self::spawn_error(tool, e))?;

        let copied = match child.stdin.take() {
            Some(mut stdin) => io::copy(input, &mut stdin).map(|_| ()),
            None => Ok(()),
        };
        // stdin is dropped here so the child sees EOF before we wait
        let status = child.wait()?;

        if let Err(e) = copied {
            if status.success() {
                return Err(StewardError::Io(format!("Failed to feed {}: {}", tool, e)));
            }
        }
        Self::finish(tool, status, log)
    }

    /// Run a command streaming its stdout into `output`
    pub fn run_to_writer(
        &self,
        tool: &str,
        cmd: &mut Command,
        output: &mut dyn Write,
    ) -> StewardResult<()> {
        let (log, file) = self.open_log(tool)?;
        debug!(tool, command = ?cmd, "running with captured output");

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(file))
            .spawn()
            .map_err(|e| Self::spawn_error(tool, e))?;

        let copied = match child.stdout.take() {
            Some(mut stdout) => io::copy(&mut stdout, output).map(|_| ()),
            None => Ok(()),
        };
        let status = child.wait()?;

        if let Err(e) = copied {
            if status.success() {
                return Err(StewardError::Io(format!(
                    "Failed to store output of {}: {}",
                    tool, e
                )));
            }
        }
        Self::finish(tool, status, log)
    }

    /// Whether a command exits successfully, with output discarded
    ///
    /// Used for status queries where a non-zero exit is an answer, not an error.
    pub fn probe(&self, cmd: &mut Command) -> StewardResult<bool> {
        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| Self::spawn_error(&format!("{:?}", cmd.get_program()), e))?;
        Ok(status.success())
    }
}

/// Run `cmd` as `account` when we have the privilege to switch users
pub fn as_account<'a>(cmd: &'a mut Command, account: &ServiceAccount) -> &'a mut Command {
    let euid = nix::unistd::Uid::effective();
    if euid.is_root() && euid.as_raw() != account.uid {
        cmd.uid(account.uid).gid(account.gid);
        cmd.env("HOME", &account.home).env("USER", &account.name);
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn test_success_removes_log() {
        let temp = TempDir::new().unwrap();
        let runner = ToolRunner::new(temp.path().join("logs"));

        runner.run("echo", &mut sh("echo hello")).unwrap();
        assert_eq!(fs::read_dir(runner.log_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_success_when_log_already_removed() {
        let temp = TempDir::new().unwrap();
        let runner = ToolRunner::new(temp.path().join("logs"));
        let script = format!("rm -f {}/*", runner.log_dir().display());

        runner.run("cleaner", &mut sh(&script)).unwrap();
        assert_eq!(fs::read_dir(runner.log_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_failure_keeps_log_with_output() {
        let temp = TempDir::new().unwrap();
        let runner = ToolRunner::new(temp.path().join("logs"));

        let err = runner
            .run("failing-tool", &mut sh("echo boom >&2; exit 3"))
            .unwrap_err();
        match err {
            StewardError::Tool { tool, log, .. } => {
                assert_eq!(tool, "failing-tool");
                assert!(fs::read_to_string(log).unwrap().contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_binary_is_precondition() {
        let temp = TempDir::new().unwrap();
        let runner = ToolRunner::new(temp.path().to_path_buf());
        let err = runner
            .run("nope", &mut Command::new("definitely-not-a-real-tool-xyz"))
            .unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_input_and_output_streaming() {
        let temp = TempDir::new().unwrap();
        let runner = ToolRunner::new(temp.path().to_path_buf());
        let target = temp.path().join("copy.txt");

        let mut input: &[u8] = b"row 1\nrow 2\n";
        runner
            .run_with_input(
                "cat",
                &mut sh(&format!("cat > {}", target.display())),
                &mut input,
            )
            .unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "row 1\nrow 2\n");

        let mut out = Vec::new();
        runner
            .run_to_writer("cat", &mut sh(&format!("cat {}", target.display())), &mut out)
            .unwrap();
        assert_eq!(out, b"row 1\nrow 2\n");
    }

    #[test]
    fn test_probe_reports_exit_status() {
        let temp = TempDir::new().unwrap();
        let runner = ToolRunner::new(temp.path().to_path_buf());
        assert!(runner.probe(&mut sh("exit 0")).unwrap());
        assert!(!runner.probe(&mut sh("exit 1")).unwrap());
    }
}
