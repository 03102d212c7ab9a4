//! Dry-run gate in front of a `CommandRunner`.
//!
//! With dry-run enabled, commands that change anything are logged as
//! intentions and reported as successful without being run. Read-only
//! commands still run.

use std::time::Duration;

use crate::runner::{CommandRunner, CommandSpec};
use crate::{dlog, dlog_debug, Error, Result};

pub struct Shell<'a> {
    runner: &'a dyn CommandRunner,
    dry_run: bool,
}

impl<'a> Shell<'a> {
    pub fn new(runner: &'a dyn CommandRunner, dry_run: bool) -> Self {
        Self { runner, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn gated(&self, cmd: &CommandSpec) -> bool {
        if self.dry_run && !cmd.is_read_only() {
            dlog!("[dry-run] would run: {}", cmd);
            return true;
        }
        false
    }

    /// Run `cmd` on behalf of `step` and return its stdout. A non-zero exit
    /// becomes `Error::CommandFailed`.
    pub fn run(&self, step: &str, cmd: &CommandSpec) -> Result<String> {
        if self.gated(cmd) {
            return Ok(String::new());
        }
        dlog_debug!("Running: {}", cmd);
        let output = self.runner.run(cmd)?;
        if !output.success() {
            return Err(Error::CommandFailed {
                step: step.to_string(),
                command: cmd.to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Like `run`, echoing stdout for the CI job log.
    pub fn run_echo(&self, step: &str, cmd: &CommandSpec) -> Result<()> {
        let stdout = self.run(step, cmd)?;
        if !stdout.is_empty() {
            print!("{}", stdout);
            if !stdout.ends_with('\n') {
                println!();
            }
        }
        Ok(())
    }

    /// Start `cmd` in the background. `None` in dry-run.
    pub fn spawn(&self, cmd: &CommandSpec) -> Result<Option<u32>> {
        if self.gated(cmd) {
            return Ok(None);
        }
        dlog_debug!("Spawning: {}", cmd);
        Ok(Some(self.runner.spawn(cmd)?))
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.runner.is_alive(pid)
    }

    pub fn terminate(&self, pid: u32) -> Result<bool> {
        self.runner.terminate(pid)
    }

    /// Pauses are skipped in dry-run.
    pub fn pause(&self, duration: Duration) {
        if self.dry_run || duration.is_zero() {
            return;
        }
        dlog_debug!("Waiting {:?}", duration);
        self.runner.sleep(duration);
    }
}
