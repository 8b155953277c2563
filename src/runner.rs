//! Child-process execution with timeout and outcome classification
//!
//! Every benchmark run and every toolchain invocation goes through an
//! [`Executor`]. [`ProcessRunner`] is the real one: argument vectors are
//! passed straight to `execve` (no shell), standard input is `/dev/null`,
//! and a timed-out child is killed together with its whole process group.
//!
//! # Example
//!
//! ```rust,no_run
//! use kernel_sweep::runner::{Executor, Invocation, ProcessRunner};
//! use std::time::Duration;
//!
//! # async fn example() -> kernel_sweep::Result<()> {
//! let invocation = Invocation::new("./histogram_omp", Duration::from_secs(120))
//!     .args(["--array-len", "1000", "--nb-bins", "5", "--nb-repeat", "10"])
//!     .env("OMP_NUM_THREADS", "4");
//! let outcome = ProcessRunner::new().execute(&invocation).await?;
//! println!("{}", outcome.label());
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// One fully specified child-process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Duration,
}

impl Invocation {
    /// Create an invocation with no arguments and no environment overlay.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Overlay one environment variable for this child only.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Program path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Argument vector (program excluded).
    #[must_use]
    pub fn arg_list(&self) -> &[String] {
        &self.args
    }

    /// Environment overlay.
    #[must_use]
    pub const fn env_overlay(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Wall-clock budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Human-readable command line, for logs only.
    #[must_use]
    pub fn display_command(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Classified result of one invocation. Exactly one variant holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Exit code 0
    Success {
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
        /// Always 0
        exit_code: i32,
    },
    /// Killed after exceeding the timeout
    Timeout,
    /// Program does not exist
    NotFound,
    /// Non-zero exit, or `exit_code: None` when killed by a signal
    NonZeroExit {
        /// Exit code
        exit_code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },
}

impl ExecutionOutcome {
    /// `true` for [`ExecutionOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short tag for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::NonZeroExit { .. } => "non_zero_exit",
        }
    }

    /// Standard output of a successful run, or the failure as an [`Error`].
    ///
    /// # Errors
    ///
    /// Maps `Timeout`, `NotFound` and `NonZeroExit` to the matching error.
    pub fn into_stdout(self, invocation: &Invocation) -> Result<String> {
        match self {
            Self::Success { stdout, .. } => Ok(stdout),
            Self::Timeout => Err(Error::ProcessTimeout {
                program: invocation.program().to_path_buf(),
                timeout: invocation.timeout(),
            }),
            Self::NotFound => Err(Error::ExecutableNotFound(invocation.program().to_path_buf())),
            Self::NonZeroExit { exit_code, stderr } => Err(Error::NonZeroExit {
                code: exit_code,
                stderr,
            }),
        }
    }
}

/// Seam between the orchestrator and real processes.
pub trait Executor: Send + Sync {
    /// Run one invocation to completion or timeout.
    ///
    /// `Err` is reserved for engine-side failures (e.g. spawn permission
    /// errors); every child-side result is an [`ExecutionOutcome`].
    fn execute(
        &self,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<ExecutionOutcome>> + Send;
}

/// Executes invocations as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner {
    _private: (),
}

impl ProcessRunner {
    /// Create a runner.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    async fn run(invocation: &Invocation) -> Result<ExecutionOutcome> {
        debug!(command = %invocation.display_command(), env = ?invocation.env_overlay(), "spawning");

        let mut std_command = std::process::Command::new(invocation.program());
        std_command
            .args(invocation.arg_list())
            .envs(invocation.env_overlay())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group so a timeout can take down grandchildren too.
            std_command.process_group(0);
        }
        let mut command = Command::from(std_command);
        command.kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ExecutionOutcome::NotFound);
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let collect = async {
            let (status, out, err) = tokio::join!(
                child.wait(),
                read_all(stdout.as_mut()),
                read_all(stderr.as_mut())
            );
            Ok::<_, std::io::Error>((status?, out?, err?))
        };
        let finished = tokio::time::timeout(invocation.timeout(), collect).await;

        match finished {
            Ok(result) => {
                let (status, out, err) = result?;
                Ok(classify(status, &out, &err))
            }
            Err(_) => {
                warn!(
                    command = %invocation.display_command(),
                    timeout_secs = invocation.timeout().as_secs_f64(),
                    "timeout exceeded, killing process group"
                );
                terminate(&mut child).await;
                Ok(ExecutionOutcome::Timeout)
            }
        }
    }
}

impl Executor for ProcessRunner {
    async fn execute(&self, invocation: &Invocation) -> Result<ExecutionOutcome> {
        Self::run(invocation).await
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<&mut R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

fn classify(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> ExecutionOutcome {
    let stderr = String::from_utf8_lossy(stderr).into_owned();
    match status.code() {
        Some(0) => ExecutionOutcome::Success {
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr,
            exit_code: 0,
        },
        code => ExecutionOutcome::NonZeroExit {
            exit_code: code,
            stderr,
        },
    }
}

/// Kill the child's process group, then the child itself, and reap it.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        #[allow(clippy::cast_possible_wrap)]
        let pgid = pid as libc::pid_t;
        // SAFETY: killpg only sends a signal; the group was created by process_group(0).
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc != 0 {
            debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
        }
    }
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "child already gone");
    }
    match child.wait().await {
        Ok(status) => debug!(%status, "timed-out child reaped"),
        Err(e) => debug!(error = %e, "failed to reap timed-out child"),
    }
}
