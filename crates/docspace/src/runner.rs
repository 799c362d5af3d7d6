//! External tool execution.
//!
//! Tools are looked up by name inside a single executable root and started
//! with an argument vector, never through a shell, so file names and
//! configuration values cannot inject commands. The call blocks until the
//! child exits or its [`Deadline`] passes.
//!
//! Success and failure are decided by the exit status alone. Output is
//! captured for diagnostics only.

use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{DocspaceError, Result};
use crate::segment::PathSegment;
use crate::time::Deadline;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One request to run an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Executable name, looked up in the runner's executable root.
    pub tool: String,
    /// Working directory for the child.
    pub working_dir: PathBuf,
    /// Arguments, passed verbatim.
    pub args: Vec<OsString>,
}

impl ToolInvocation {
    /// A tool run in `working_dir` with no arguments yet.
    pub fn new(tool: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            working_dir: working_dir.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// What a finished tool run produced.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Tool name.
    pub tool: String,
    /// Exit code; `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
    /// Wall time on the monotonic clock.
    pub elapsed: Duration,
}

impl ToolOutcome {
    /// Whether the tool exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turn a non-zero exit into [`DocspaceError::NonZeroExit`].
    pub fn check(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(DocspaceError::NonZeroExit {
                tool: self.tool,
                code: self.exit_code,
            })
        }
    }
}

/// Runs named executables from one trusted directory.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    executable_root: PathBuf,
    timeout: Option<Duration>,
}

impl ToolRunner {
    /// A runner for tools under `executable_root`, without a timeout.
    pub fn new(executable_root: impl Into<PathBuf>) -> Self {
        Self {
            executable_root: executable_root.into(),
            timeout: None,
        }
    }

    /// Kill tools that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Directory tools are looked up in.
    pub fn executable_root(&self) -> &Path {
        &self.executable_root
    }

    /// Configured timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Absolute path of `tool`, which must name a file in the executable root.
    pub fn executable(&self, tool: &str) -> Result<PathBuf> {
        let name = PathSegment::parse(tool)?;
        let path = self.executable_root.join(&name);
        if !path.is_file() {
            return Err(DocspaceError::ToolNotFound {
                tool: path.display().to_string(),
            });
        }
        Ok(path)
    }

    /// Run the invocation to completion.
    ///
    /// Blocks the calling thread. Returns the outcome for any exit status;
    /// use [`ToolOutcome::check`] to treat non-zero exits as errors.
    pub fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutcome> {
        let program = self.executable(&invocation.tool)?;
        let deadline = Deadline::new(self.timeout);

        debug!(
            tool = %invocation.tool,
            cwd = %invocation.working_dir.display(),
            args = ?invocation.args,
            "spawning tool"
        );

        let mut command = Command::new(&program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout reaches whatever the tool forked.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);

        let mut child = command
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => DocspaceError::ToolNotFound {
                    tool: program.display().to_string(),
                },
                _ => DocspaceError::Io {
                    path: program.clone(),
                    source: e,
                },
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait(&mut child, &deadline) {
            Ok(status) => status,
            Err(WaitError::Expired) => {
                let after = deadline.limit().unwrap_or_default();
                warn!(tool = %invocation.tool, ?after, "tool timed out; killed");
                return Err(DocspaceError::Timeout {
                    tool: invocation.tool.clone(),
                    after,
                });
            }
            Err(WaitError::Io(e)) => return Err(DocspaceError::io(&program, e)),
        };

        let outcome = ToolOutcome {
            tool: invocation.tool.clone(),
            exit_code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
            elapsed: deadline.elapsed(),
        };

        info!(
            tool = %outcome.tool,
            exit_code = ?outcome.exit_code,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "tool finished"
        );
        Ok(outcome)
    }
}

enum WaitError {
    Expired,
    Io(io::Error),
}

fn wait(child: &mut Child, deadline: &Deadline) -> std::result::Result<ExitStatus, WaitError> {
    if deadline.limit().is_none() {
        return child.wait().map_err(WaitError::Io);
    }

    loop {
        if let Some(status) = child.try_wait().map_err(WaitError::Io)? {
            return Ok(status);
        }
        if deadline.is_expired() {
            // Already-exited children make kill fail; reap either way.
            kill_tree(child);
            let _ = child.wait();
            return Err(WaitError::Expired);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let group = i32::try_from(child.id()).map(Pid::from_raw);
    if group.map_or(true, |group| killpg(group, Signal::SIGKILL).is_err()) {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Read a pipe to the end on its own thread so a chatty child cannot block
/// on a full pipe buffer while we wait for it.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn write_tool(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_missing_tool() {
        let bin = tempdir().unwrap();
        let runner = ToolRunner::new(bin.path());
        let result = runner.run(&ToolInvocation::new("beagleviz", bin.path()));
        assert!(matches!(result, Err(DocspaceError::ToolNotFound { .. })));
    }

    #[test]
    fn test_tool_name_cannot_leave_executable_root() {
        let bin = tempdir().unwrap();
        let runner = ToolRunner::new(bin.path());
        let result = runner.run(&ToolInvocation::new("../sh", bin.path()));
        assert!(matches!(result, Err(DocspaceError::InvalidPath { .. })));
    }

    #[test]
    fn test_arguments_are_not_shell_interpreted() {
        let bin = tempdir().unwrap();
        let work = tempdir().unwrap();
        write_tool(bin.path(), "echoargs", r#"for a in "$@"; do printf '%s\n' "$a"; done"#);

        let runner = ToolRunner::new(bin.path());
        let invocation = ToolInvocation::new("echoargs", work.path())
            .arg("two words")
            .arg("$(touch pwned); rm -rf x");
        let outcome = runner.run(&invocation).unwrap();

        assert!(outcome.success());
        assert_eq!(
            String::from_utf8_lossy(&outcome.stdout),
            "two words\n$(touch pwned); rm -rf x\n"
        );
        assert!(!work.path().join("pwned").exists());
    }

    #[test]
    fn test_runs_in_working_directory() {
        let bin = tempdir().unwrap();
        let work = tempdir().unwrap();
        write_tool(bin.path(), "marker", "touch here");

        ToolRunner::new(bin.path())
            .run(&ToolInvocation::new("marker", work.path()))
            .unwrap();
        assert!(work.path().join("here").exists());
    }

    #[test]
    fn test_non_zero_exit_is_reported_not_raised() {
        let bin = tempdir().unwrap();
        write_tool(bin.path(), "fail", "echo broken >&2; exit 3");

        let outcome = ToolRunner::new(bin.path())
            .run(&ToolInvocation::new("fail", bin.path()))
            .unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert!(String::from_utf8_lossy(&outcome.stderr).contains("broken"));
        assert!(matches!(
            outcome.check(),
            Err(DocspaceError::NonZeroExit { code: Some(3), .. })
        ));
    }

    #[test]
    fn test_timeout_kills_child() {
        let bin = tempdir().unwrap();
        write_tool(bin.path(), "slow", "exec sleep 5");

        let runner = ToolRunner::new(bin.path()).with_timeout(Some(Duration::from_millis(100)));
        let started = std::time::Instant::now();
        let result = runner.run(&ToolInvocation::new("slow", bin.path()));

        assert!(matches!(result, Err(DocspaceError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_kills_forked_descendants() {
        let bin = tempdir().unwrap();
        let work = tempdir().unwrap();
        write_tool(bin.path(), "forks", "(sleep 1; touch late) &\nsleep 5");

        let runner = ToolRunner::new(bin.path()).with_timeout(Some(Duration::from_millis(200)));
        let result = runner.run(&ToolInvocation::new("forks", work.path()));
        assert!(matches!(result, Err(DocspaceError::Timeout { .. })));

        thread::sleep(Duration::from_millis(1500));
        assert!(!work.path().join("late").exists());
    }
}
