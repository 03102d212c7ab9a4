//! Helm 2 client steps and the local Tiller it talks to.
//!
//! Tiller runs as a child process for the duration of the pipeline. Every
//! helm invocation gets `HELM_HOST` pointing at it.

use crate::config::ToolConfig;
use crate::deploy_args::SetFlag;
use crate::image_pull;
use crate::runner::CommandSpec;
use crate::settings::Settings;
use crate::shell::Shell;
use crate::{dlog, dlog_debug, dlog_warn, Error, Result};

pub struct Helm<'a> {
    settings: &'a Settings,
    config: &'a ToolConfig,
}

impl<'a> Helm<'a> {
    pub fn new(settings: &'a Settings, config: &'a ToolConfig) -> Self {
        Self { settings, config }
    }

    fn helm(&self) -> CommandSpec {
        CommandSpec::new(self.config.helm_bin()).env("HELM_HOST", self.config.effective_tiller_host())
    }

    pub fn tiller(&self) -> CommandSpec {
        CommandSpec::new(self.config.tiller_bin())
            .arg(format!("--storage={}", self.config.effective_tiller_storage()))
            .arg(format!("--listen={}", self.config.effective_tiller_host()))
            .env("TILLER_NAMESPACE", &self.settings.namespace)
    }

    pub fn init_client(&self) -> CommandSpec {
        self.helm().args(["init", "--client-only"])
    }

    pub fn repo_update(&self) -> CommandSpec {
        self.helm().args(["repo", "update"])
    }

    pub fn lint_command(&self) -> CommandSpec {
        let chart = self.settings.chart_path(self.config.effective_chart_root());
        self.helm()
            .arg("lint")
            .arg(chart.display().to_string())
            .read_only()
    }

    /// Overrides every release gets, before image pull and project flags.
    pub fn base_flags(&self) -> Vec<SetFlag> {
        let s = self.settings;
        vec![
            SetFlag::new("image.repository", &s.registry_image),
            SetFlag::new("image.tag", &s.commit_short_sha),
            SetFlag::new("environment", &s.environment_name),
            SetFlag::new("commitSha", &s.commit_short_sha),
            SetFlag::new("gitRef", &s.ref_slug),
            SetFlag::new("jobId", &s.job_id),
        ]
    }

    pub fn upgrade(&self) -> CommandSpec {
        let s = self.settings;
        let chart = s.chart_path(self.config.effective_chart_root());
        let mut cmd = self.helm().args([
            "upgrade".to_string(),
            s.deployment_name(),
            chart.display().to_string(),
            "--install".to_string(),
            "--recreate-pods".to_string(),
            "--wait".to_string(),
            "--namespace".to_string(),
            s.namespace.clone(),
        ]);

        let flags = self
            .base_flags()
            .into_iter()
            .chain(image_pull::build(&s.visibility, &s.registry))
            .chain(s.deploy_args.iter().cloned());
        for flag in flags {
            cmd = cmd.arg("--set");
            cmd = if flag.secret {
                cmd.secret_arg(flag.assignment())
            } else {
                cmd.arg(flag.assignment())
            };
        }

        if let Some(secs) = self.config.helm_timeout_secs {
            cmd = cmd.args(["--timeout".to_string(), secs.to_string()]);
        }
        cmd
    }

    /// Start Tiller, check it stayed up, then initialize the client.
    /// The returned guard stops Tiller when dropped.
    pub fn init<'s>(&self, shell: &'s Shell<'s>) -> Result<TillerGuard<'s>> {
        let tiller = TillerGuard {
            shell,
            pid: shell.spawn(&self.tiller())?,
        };
        shell.pause(self.config.tiller_startup_wait());

        if let Some(pid) = tiller.pid {
            if !shell.is_alive(pid) {
                return Err(Error::ProcessNotAlive { pid });
            }
            dlog!("Tiller running (pid {})", pid);
        }

        shell.run("init", &self.init_client())?;
        shell.run("init", &self.repo_update())?;
        Ok(tiller)
    }

    pub fn lint(&self, shell: &Shell) -> Result<()> {
        let chart = self.settings.chart_path(self.config.effective_chart_root());
        if !chart.is_dir() {
            return Err(Error::ChartNotFound(chart));
        }
        dlog!("Linting chart {}", chart.display());
        shell.run_echo("lint", &self.lint_command())
    }

    pub fn deploy(&self, shell: &Shell) -> Result<()> {
        self.settings.check_release_name();
        dlog!(
            "Deploying release {} to namespace {}",
            self.settings.deployment_name(),
            self.settings.namespace
        );
        shell.run_echo("deploy", &self.upgrade())
    }
}

/// Owns the background Tiller process. Dropping the guard terminates it, so
/// an aborted pipeline does not leave Tiller running.
pub struct TillerGuard<'s> {
    shell: &'s Shell<'s>,
    pid: Option<u32>,
}

impl TillerGuard<'_> {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Stop Tiller. Never fails: a missing process is only a warning.
    pub fn teardown(mut self) {
        if self.pid.is_none() && self.shell.is_dry_run() {
            dlog!("[dry-run] would stop Tiller");
        }
        self.stop();
    }

    fn stop(&mut self) {
        let Some(pid) = self.pid.take() else {
            return;
        };
        match self.shell.terminate(pid) {
            Ok(true) => dlog!("Stopped Tiller (pid {})", pid),
            Ok(false) => dlog_warn!("Tiller (pid {}) was already gone", pid),
            Err(e) => dlog_warn!("Failed to stop Tiller (pid {}): {}", pid, e),
        }
    }
}

impl Drop for TillerGuard<'_> {
    fn drop(&mut self) {
        if self.pid.is_some() {
            dlog_debug!("Stopping Tiller on early exit");
            self.stop();
        }
    }
}
