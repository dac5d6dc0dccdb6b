//! Bounded execution of external diagnostic commands.
//!
//! Everything here blocks the calling thread. Callers dispatch through
//! [`crate::pool::WorkerPool`], never from a request handler directly.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProbeError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long output is still collected once the child is gone. Bounds the
/// wait when a grandchild outside our reach keeps the pipes open.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
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

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// What a finished (or killed) command left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed or ended by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl RunOutput {
    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("command cancelled")]
    Cancelled,
}

impl RunError {
    /// Map onto the probe taxonomy for the named facility.
    pub fn into_probe_error(self, facility: &'static str) -> ProbeError {
        match self {
            RunError::Launch { program, source } => {
                ProbeError::unavailable(facility, format!("cannot launch {program}: {source}"))
            }
            RunError::Cancelled => ProbeError::Cancelled,
        }
    }
}

/// Executes external commands. Implementations must not fail on non-zero
/// exit or timeout; only on launch failure or cancellation.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, RunError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, RunError> {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        debug!(command = %cmd, timeout_s = timeout.as_secs(), "spawning");
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a kill also reaches wrapper children (sudo nmap ...).
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(|source| RunError::Launch {
            program: cmd.program.clone(),
            source,
        })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let waited = wait_bounded(&mut child, timeout, cancel);

        let drain_until = Instant::now() + DRAIN_GRACE;
        let stdout = collect(stdout, drain_until);
        let stderr = collect(stderr, drain_until);

        match waited {
            Waited::Exited(status) => Ok(RunOutput {
                stdout,
                stderr,
                exit_code: status.code(),
                timed_out: false,
            }),
            Waited::TimedOut => {
                warn!(command = %cmd, timeout_s = timeout.as_secs(), "command timed out, killed");
                Ok(RunOutput {
                    stdout,
                    stderr,
                    exit_code: None,
                    timed_out: true,
                })
            }
            Waited::Cancelled => {
                debug!(command = %cmd, "command cancelled, killed");
                Err(RunError::Cancelled)
            }
        }
    }
}

enum Waited {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

fn wait_bounded(child: &mut Child, timeout: Duration, cancel: &CancellationToken) -> Waited {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Waited::Exited(status),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "try_wait failed, killing child");
                kill(child);
                return Waited::TimedOut;
            }
        }
        if cancel.is_cancelled() {
            kill(child);
            return Waited::Cancelled;
        }
        if start.elapsed() >= timeout {
            kill(child);
            return Waited::TimedOut;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn kill(child: &mut Child) {
    #[cfg(unix)]
    {
        // The child leads its own group; a negative pid signals every member.
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: kill(2) only takes plain integers.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    // Reap so the pipes close and the reader threads see EOF.
    let _ = child.wait();
}

/// Forward everything read from `pipe` in chunks until EOF.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(chunk[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// Gather chunks until the reader hits EOF or `until` passes.
fn collect(chunks: Option<Receiver<Vec<u8>>>, until: Instant) -> String {
    let mut buf = Vec::new();
    if let Some(rx) = chunks {
        while let Ok(chunk) = rx.recv_timeout(until.saturating_duration_since(Instant::now())) {
            buf.extend_from_slice(&chunk);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
