use crate::RuntimeError;
use serde::Serialize;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time a child gets between `SIGTERM` and `SIGKILL`.
pub const DEFAULT_TERM_GRACE: Duration = Duration::from_secs(3);

/// Shared flag that asks a running child to terminate.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a launched child finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(i32),
    Cancelled,
    TimedOut,
}

impl ExitOutcome {
    /// Process exit code a launcher should report for this outcome.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Signaled(sig) => 128 + sig,
            Self::Cancelled | Self::TimedOut => 1,
        }
    }

    pub fn success(self) -> bool {
        self == Self::Exited(0)
    }
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with status {code}"),
            Self::Signaled(sig) => write!(f, "killed by signal {sig}"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Split a command line into words.
///
/// Words are separated by unquoted whitespace. Single quotes preserve
/// everything literally; double quotes allow `\"`, `\\`, `\$` and `` \` `` escapes;
/// outside quotes a backslash escapes the next character.
pub fn split_command(line: &str) -> Result<Vec<String>, RuntimeError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => current.push(c),
            (Some(_), '"') => quote = None,
            (Some(_), '\\') => match chars.next() {
                Some(next @ ('"' | '\\' | '$' | '`')) => current.push(next),
                Some(next) => {
                    current.push('\\');
                    current.push(next);
                }
                None => break,
            },
            (Some(_), _) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, '\\') => {
                let next = chars.next().ok_or_else(|| {
                    RuntimeError::InvalidCommand(format!("trailing backslash in '{line}'"))
                })?;
                current.push(next);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, _) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(RuntimeError::InvalidCommand(format!(
            "unterminated {q} quote in '{line}'"
        )));
    }
    if in_word {
        words.push(current);
    }
    if words.is_empty() {
        return Err(RuntimeError::InvalidCommand("empty command".to_owned()));
    }
    Ok(words)
}

/// Program paths like `./node` or `bin/app` are relative to the extraction
/// root; bare names are looked up on `PATH` by the OS.
pub fn resolve_program(program: &str, root: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && program.contains('/') {
        root.join(path)
    } else {
        path.to_path_buf()
    }
}

/// A fully resolved child process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Added to the inherited environment.
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub grace: Duration,
}

impl LaunchSpec {
    pub fn from_command_line(
        line: &str,
        working_dir: impl Into<PathBuf>,
    ) -> Result<Self, RuntimeError> {
        let working_dir = working_dir.into();
        let mut words = split_command(line)?.into_iter();
        let program = words
            .next()
            .ok_or_else(|| RuntimeError::InvalidCommand("empty command".to_owned()))?;
        Ok(Self {
            program: resolve_program(&program, &working_dir),
            args: words.collect(),
            working_dir,
            env: Vec::new(),
            timeout: None,
            grace: DEFAULT_TERM_GRACE,
        })
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn display_command(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Spawn the child and block until it exits, is cancelled, or times out.
///
/// Cancellation and timeout terminate the child (`SIGTERM`, then `SIGKILL`
/// after the grace period) and are reported as outcomes, not errors.
pub fn run_to_completion(
    spec: &LaunchSpec,
    cancel: &CancelToken,
) -> Result<ExitOutcome, RuntimeError> {
    if !spec.working_dir.is_dir() {
        return Err(RuntimeError::ExecFailed(format!(
            "working directory {} does not exist",
            spec.working_dir.display()
        )));
    }

    debug!(
        "spawning '{}' in {}",
        spec.display_command(),
        spec.working_dir.display()
    );
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(&spec.working_dir)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                RuntimeError::CommandNotFound(spec.program.display().to_string())
            }
            _ => RuntimeError::ExecFailed(format!(
                "failed to start {}: {e}",
                spec.program.display()
            )),
        })?;

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let outcome = outcome_from(status);
                debug!("child {} {outcome}", child.id());
                return Ok(outcome);
            }
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RuntimeError::Interrupted(e.to_string()));
            }
        }

        if cancel.is_cancelled() {
            debug!("cancellation requested, terminating child {}", child.id());
            terminate(&mut child, spec.grace)?;
            return Ok(ExitOutcome::Cancelled);
        }
        if spec.timeout.is_some_and(|limit| started.elapsed() >= limit) {
            warn!(
                "child {} exceeded its timeout, terminating",
                child.id()
            );
            terminate(&mut child, spec.grace)?;
            return Ok(ExitOutcome::TimedOut);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn outcome_from(status: ExitStatus) -> ExitOutcome {
    match (status.code(), status.signal()) {
        (Some(code), _) => ExitOutcome::Exited(code),
        (None, Some(sig)) => ExitOutcome::Signaled(sig),
        (None, None) => ExitOutcome::Exited(1),
    }
}

fn terminate(child: &mut Child, grace: Duration) -> Result<(), RuntimeError> {
    send_sigterm(child.id());
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
    debug!("child {} ignored SIGTERM, killing", child.id());
    if let Err(e) = child.kill() {
        // InvalidInput means the child already exited.
        if e.kind() != io::ErrorKind::InvalidInput {
            return Err(e.into());
        }
    }
    child.wait()?;
    Ok(())
}

#[allow(unsafe_code)]
fn send_sigterm(pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill() only sends a signal; the pid belongs to our unreaped child.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
}
