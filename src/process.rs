//! External tool adapter.
//!
//! Every external invocation in the pipeline goes through [`Cmd`], which
//! turns a process run into a structured result (exit code plus captured
//! output) or a typed failure. This keeps discovery and verification logic
//! out of direct process-spawning so it can be tested without the tools
//! installed.
//!
//! Two run modes:
//! - [`Cmd::run`] captures stdout/stderr (short, parseable invocations)
//! - [`Cmd::stream`] inherits stdio so long builds show progress in real
//!   time; these run unbounded
//!
//! A bounded wait ([`Cmd::timeout`]) is only meant for lightweight probes
//! like `--version` checks.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::PipelineError;

/// Builder for an external tool invocation.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    error_msg: Option<String>,
    allow_fail: bool,
    timeout: Option<Duration>,
}

/// Captured result of a completed invocation.
#[derive(Debug)]
pub struct CmdResult {
    /// Exit code (-1 when terminated by a signal).
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdResult {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            error_msg: None,
            allow_fail: false,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a path argument (lossy UTF-8 conversion).
    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().to_string())
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Message used when the invocation fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Non-zero exit becomes a normal result instead of an error.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Bounded wait. Only for lightweight probes; builds run unbounded.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    fn describe(&self) -> String {
        self.error_msg
            .clone()
            .unwrap_or_else(|| format!("{} failed", self.program))
    }

    /// Run with captured output.
    pub fn run(self) -> Result<CmdResult> {
        if let Some(duration) = self.timeout {
            return self.run_bounded(duration);
        }

        let output = self.command().output().map_err(|e| spawn_error(&self.program, &e))?;
        let result = CmdResult {
            code: exit_code(&output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        self.check(&output.status, result)
    }

    /// Run with stdio inherited so output streams to the operator.
    pub fn stream(self) -> Result<CmdResult> {
        let status = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| spawn_error(&self.program, &e))?;
        let result = CmdResult {
            code: exit_code(&status),
            stdout: String::new(),
            stderr: String::new(),
        };
        self.check(&status, result)
    }

    fn run_bounded(self, duration: Duration) -> Result<CmdResult> {
        let mut child = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.program, &e))?;

        let deadline = Instant::now() + duration;
        let status = loop {
            match child.try_wait().context("waiting for child process")? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(PipelineError::Precondition(format!(
                        "{} did not respond within {}s",
                        self.program,
                        duration.as_secs()
                    ))
                    .into());
                }
                None => std::thread::sleep(Duration::from_millis(50)),
            }
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout);
        }
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr);
        }
        let result = CmdResult {
            code: exit_code(&status),
            stdout,
            stderr,
        };
        self.check(&status, result)
    }

    fn check(&self, status: &std::process::ExitStatus, result: CmdResult) -> Result<CmdResult> {
        if status.success() || self.allow_fail {
            return Ok(result);
        }
        if was_interrupted(status) {
            return Err(PipelineError::Interrupted(self.program.clone()).into());
        }
        let err = PipelineError::ToolInvocation {
            tool: self.program.clone(),
            code: result.code,
        };
        if result.stderr.trim().is_empty() {
            Err(anyhow::Error::new(err).context(self.describe()))
        } else {
            Err(anyhow::Error::new(err)
                .context(format!("{}\n{}", self.describe(), result.stderr.trim())))
        }
    }
}

fn spawn_error(program: &str, err: &std::io::Error) -> anyhow::Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        PipelineError::Precondition(format!("{} is not installed or not in PATH", program)).into()
    } else {
        anyhow::anyhow!("failed to execute {}: {}", program, err)
    }
}

fn exit_code(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(unix)]
fn was_interrupted(status: &std::process::ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal().is_some()
}

#[cfg(not(unix))]
fn was_interrupted(_status: &std::process::ExitStatus) -> bool {
    false
}

/// Fail with a `NotFound` error when a path is missing.
pub fn ensure_exists(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        return Err(
            PipelineError::NotFound(format!("{} not found: {}", what, path.display())).into(),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_stdout() {
        let result = Cmd::new("echo").arg("hello").run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn test_nonzero_exit_is_tool_invocation() {
        let err = Cmd::new("false").run().unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::ToolInvocation { code, .. }) => assert_eq!(*code, 1),
            other => panic!("expected ToolInvocation, got {:?}", other),
        }
    }

    #[test]
    fn test_allow_fail_returns_result() {
        let result = Cmd::new("false").allow_fail().run().unwrap();
        assert!(!result.success());
        assert_eq!(result.code, 1);
    }

    #[test]
    fn test_missing_program_is_precondition() {
        let err = Cmd::new("definitely_not_a_real_command_12345").run().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Precondition(_))
        ));
    }

    #[test]
    fn test_bounded_run_times_out() {
        let err = Cmd::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100))
            .run()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Precondition(_))
        ));
    }

    #[test]
    fn test_bounded_run_within_deadline() {
        let result = Cmd::new("echo")
            .arg("fast")
            .timeout(Duration::from_secs(5))
            .run()
            .unwrap();
        assert_eq!(result.stdout.trim(), "fast");
    }

    #[test]
    fn test_ensure_exists() {
        assert!(ensure_exists(Path::new("/"), "root").is_ok());
        let err = ensure_exists(Path::new("/no/such/path/xyz"), "artifact").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NotFound(_))
        ));
    }
}
