//! External command execution.
//!
//! `CommandSpec` describes one invocation of `kubectl`, `helm` or `tiller`.
//! `CommandRunner` is the seam the pipeline executes through: `SystemRunner`
//! spawns real processes, `MockRunner` records invocations and serves
//! configured results for tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::{dlog_debug, dlog_warn, Result};

const MASK: &str = "******";
const TERMINATE_GRACE: Duration = Duration::from_secs(5);
const TERMINATE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Arg {
    value: String,
    secret: bool,
}

impl Arg {
    /// `--token=abc` → `--token=******`, a bare secret → `******`.
    fn masked(&self) -> String {
        if !self.secret {
            return self.value.clone();
        }
        match self.value.split_once('=') {
            Some((key, _)) => format!("{}={}", key, MASK),
            None => MASK.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<Arg>,
    envs: Vec<(String, String)>,
    read_only: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            read_only: false,
        }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            secret: false,
        });
        self
    }

    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for v in values {
            self = self.arg(v);
        }
        self
    }

    /// An argument whose value is masked when rendered.
    pub fn secret_arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            secret: true,
        });
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Marks a command that only reads state; the dry-run gate lets it through.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arg_values(&self) -> Vec<&str> {
        self.args.iter().map(|a| a.value.as_str()).collect()
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    /// Unmasked command line, for matching in tests. Never log this.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(|a| a.value.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(|a| &a.value));
        cmd.envs(self.envs.iter().map(|(k, v)| (k, v)));
        cmd
    }
}

/// Shell-escaped with secrets masked. Safe to log.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .envs
            .iter()
            .map(|(k, v)| format!("{}={}", k, shell_escape(v)))
            .collect();
        parts.push(shell_escape(&self.program));
        parts.extend(self.args.iter().map(|a| shell_escape(&a.masked())));
        write!(f, "{}", parts.join(" "))
    }
}

fn shell_escape(s: &str) -> String {
    if !s.is_empty()
        && s.chars().all(|c| {
            c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | ',')
        })
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait CommandRunner {
    /// Run to completion. `Err` only when the process could not be started.
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput>;

    /// Start in the background and return the pid.
    fn spawn(&self, cmd: &CommandSpec) -> Result<u32>;

    /// Zero-signal liveness probe of a child spawned by this runner.
    fn is_alive(&self, pid: u32) -> bool;

    /// SIGTERM a spawned child. Returns `false` if it was already gone.
    fn terminate(&self, pid: u32) -> Result<bool>;

    fn sleep(&self, duration: Duration);
}

/// Runs real processes. Background children are kept so they can be reaped.
#[derive(Default)]
pub struct SystemRunner {
    children: RefCell<HashMap<u32, Child>>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn reap(&self, pid: u32) {
        let Some(mut child) = self.children.borrow_mut().remove(&pid) else {
            return;
        };
        let deadline = Instant::now() + TERMINATE_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    dlog_debug!("Process {} exited: {}", pid, status);
                    return;
                }
                Ok(None) if Instant::now() < deadline => std::thread::sleep(TERMINATE_POLL),
                Ok(None) => {
                    dlog_warn!("Process {} ignored SIGTERM, killing", pid);
                    let _ = child.kill();
                    let _ = child.wait();
                    return;
                }
                Err(e) => {
                    dlog_warn!("Failed to wait for process {}: {}", pid, e);
                    return;
                }
            }
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        let output = cmd.to_command().stdin(Stdio::null()).output()?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn spawn(&self, cmd: &CommandSpec) -> Result<u32> {
        let child = cmd
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;
        let pid = child.id();
        self.children.borrow_mut().insert(pid, child);
        Ok(pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        let mut children = self.children.borrow_mut();
        let Some(child) = children.get_mut(&pid) else {
            // Not ours, or already reaped: the pid may belong to someone else.
            return false;
        };
        match child.try_wait() {
            Ok(None) => unsafe { libc::kill(pid as libc::pid_t, 0) == 0 },
            Ok(Some(status)) => {
                dlog_debug!("Process {} exited: {}", pid, status);
                children.remove(&pid);
                false
            }
            Err(e) => {
                dlog_warn!("Failed to check process {}: {}", pid, e);
                false
            }
        }
    }

    /// Only signals a child this runner spawned and has not reaped yet.
    fn terminate(&self, pid: u32) -> Result<bool> {
        if !self.is_alive(pid) {
            self.children.borrow_mut().remove(&pid);
            return Ok(false);
        }
        let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                self.children.borrow_mut().remove(&pid);
                return Ok(false);
            }
            return Err(err.into());
        }
        self.reap(pid);
        Ok(true)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone)]
struct Canned {
    prefix: String,
    output: CommandOutput,
}

/// Test double: records every command line, answers from canned outputs
/// matched by prefix, and defaults to an empty success.
#[derive(Debug)]
pub struct MockRunner {
    canned: Vec<Canned>,
    commands: RefCell<Vec<String>>,
    spawned: RefCell<Vec<String>>,
    terminated: RefCell<Vec<u32>>,
    slept: RefCell<Vec<Duration>>,
    alive: Cell<bool>,
    pid: u32,
}

impl MockRunner {
    pub const PID: u32 = 4242;

    pub fn new() -> Self {
        Self {
            canned: Vec::new(),
            commands: RefCell::new(Vec::new()),
            spawned: RefCell::new(Vec::new()),
            terminated: RefCell::new(Vec::new()),
            slept: RefCell::new(Vec::new()),
            alive: Cell::new(true),
            pid: Self::PID,
        }
    }

    /// Commands whose line starts with `prefix` exit with `code`.
    pub fn fail_on(mut self, prefix: &str, code: i32, stderr: &str) -> Self {
        self.canned.push(Canned {
            prefix: prefix.to_string(),
            output: CommandOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        });
        self
    }

    /// Commands whose line starts with `prefix` succeed printing `stdout`.
    pub fn respond(mut self, prefix: &str, stdout: &str) -> Self {
        self.canned.push(Canned {
            prefix: prefix.to_string(),
            output: CommandOutput {
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        });
        self
    }

    /// Spawned processes die immediately.
    pub fn with_dead_process(self) -> Self {
        self.alive.set(false);
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    pub fn spawned(&self) -> Vec<String> {
        self.spawned.borrow().clone()
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.borrow().clone()
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.commands.borrow().iter().any(|c| c.starts_with(prefix))
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        let line = cmd.command_line();
        self.commands.borrow_mut().push(line.clone());
        Ok(self
            .canned
            .iter()
            .find(|c| line.starts_with(&c.prefix))
            .map(|c| c.output.clone())
            .unwrap_or_else(|| CommandOutput {
                code: Some(0),
                ..Default::default()
            }))
    }

    fn spawn(&self, cmd: &CommandSpec) -> Result<u32> {
        self.spawned.borrow_mut().push(cmd.command_line());
        Ok(self.pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        pid == self.pid && self.alive.get() && !self.terminated.borrow().contains(&pid)
    }

    fn terminate(&self, pid: u32) -> Result<bool> {
        let was_alive = self.is_alive(pid);
        self.terminated.borrow_mut().push(pid);
        Ok(was_alive)
    }

    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}
