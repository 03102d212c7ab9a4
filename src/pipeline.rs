//! The deployment pipeline.
//!
//! Steps run in a fixed order and the first failure aborts the run:
//! validation of the environment, cluster login, Tiller and Helm client
//! init, chart lint, deploy, rollout watch, Tiller teardown.

use std::time::Instant;

use serde::Serialize;

use crate::config::ToolConfig;
use crate::deploy_args;
use crate::env::EnvSnapshot;
use crate::helm::Helm;
use crate::image_pull::{self, Visibility};
use crate::kubectl::Kubectl;
use crate::runner::{CommandRunner, CommandSpec};
use crate::settings::{Settings, CORE_VARS, FALLBACK_VARS, LOGIN_VARS};
use crate::shell::Shell;
use crate::{dlog, dlog_debug, dlog_error, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ValidateCore,
    ValidateFallbacks,
    ValidateDeployArgs,
    ValidateLogin,
    ValidateImagePull,
    Login,
    InitHelm,
    Lint,
    Deploy,
    Watch,
    Teardown,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::ValidateCore => "validate_core",
            Step::ValidateFallbacks => "validate_fallbacks",
            Step::ValidateDeployArgs => "validate_deploy_args",
            Step::ValidateLogin => "validate_login",
            Step::ValidateImagePull => "validate_image_pull",
            Step::Login => "login",
            Step::InitHelm => "init_helm",
            Step::Lint => "lint",
            Step::Deploy => "deploy",
            Step::Watch => "watch",
            Step::Teardown => "teardown",
        }
    }

    /// Steps that change the cluster or start processes.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Step::Login | Step::InitHelm | Step::Deploy | Step::Watch | Step::Teardown
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    pub duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one run, printed with `--json`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub deployment: Option<String>,
    pub steps: Vec<StepRecord>,
    pub ok: bool,
}

impl RunReport {
    pub fn status_of(&self, step: Step) -> Option<StepStatus> {
        self.steps.iter().find(|r| r.step == step).map(|r| r.status)
    }

    pub fn failed_step(&self) -> Option<Step> {
        self.steps
            .iter()
            .find(|r| r.status == StepStatus::Failed)
            .map(|r| r.step)
    }

    /// One line naming the failed step, for the end of the job log.
    pub fn failure_summary(&self) -> Option<String> {
        let failed = self.steps.iter().find(|r| r.status == StepStatus::Failed)?;
        Some(format!("helm-deploy aborted at step {}", failed.step.as_str()))
    }

    fn record<T>(&mut self, step: Step, started: Instant, dry_run: bool, result: Result<T>) -> Result<T> {
        let status = match &result {
            Ok(_) if dry_run && step.is_mutating() => StepStatus::Skipped,
            Ok(_) => StepStatus::Ok,
            Err(_) => StepStatus::Failed,
        };
        if let Err(e) = &result {
            dlog_error!("Step {} failed: {}", step.as_str(), e);
        }
        self.steps.push(StepRecord {
            step,
            status,
            duration_ms: started.elapsed().as_millis(),
            error: result.as_ref().err().map(ToString::to_string),
        });
        result
    }
}

pub struct Pipeline<'a> {
    env: &'a EnvSnapshot,
    config: &'a ToolConfig,
    shell: Shell<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        env: &'a EnvSnapshot,
        config: &'a ToolConfig,
        runner: &'a dyn CommandRunner,
        dry_run: bool,
    ) -> Self {
        Self {
            env,
            config,
            shell: Shell::new(runner, dry_run),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.shell.is_dry_run()
    }

    fn visibility(&self) -> Visibility {
        Visibility::parse(self.env.get("CI_PROJECT_VISIBILITY"))
    }

    fn step<T>(&self, report: &mut RunReport, step: Step, f: impl FnOnce() -> Result<T>) -> Result<T> {
        dlog_debug!("==> {}", step.as_str());
        let started = Instant::now();
        report.record(step, started, self.is_dry_run(), f())
    }

    /// Validation steps. Nothing external runs before these pass.
    pub fn validate(&self, report: &mut RunReport) -> Result<Settings> {
        let env = self.env;
        self.step(report, Step::ValidateCore, || env.require(CORE_VARS))?;
        self.step(report, Step::ValidateFallbacks, || {
            env.require_with_fallback(FALLBACK_VARS)
        })?;
        self.step(report, Step::ValidateDeployArgs, || deploy_args::validate(env))?;
        self.step(report, Step::ValidateLogin, || env.require(LOGIN_VARS))?;
        let visibility = self.visibility();
        self.step(report, Step::ValidateImagePull, || {
            image_pull::validate(env, &visibility)
        })?;

        let settings = Settings::from_env(env)?;
        report.deployment = Some(settings.deployment_name());
        dlog_debug!("Resolved settings: {}", serde_json::to_string(&settings)?);
        Ok(settings)
    }

    /// Run every step. `report` is filled in even when a step fails.
    pub fn run(&self, report: &mut RunReport) -> Result<()> {
        report.dry_run = self.is_dry_run();
        if report.dry_run {
            dlog!("Dry run: no changes will be made");
        }

        let settings = self.validate(report)?;
        let kubectl = Kubectl::new(&settings, self.config);
        let helm = Helm::new(&settings, self.config);
        let shell = &self.shell;

        self.step(report, Step::Login, || kubectl.login(shell))?;
        let tiller = self.step(report, Step::InitHelm, || helm.init(shell))?;
        self.step(report, Step::Lint, || helm.lint(shell))?;
        self.step(report, Step::Deploy, || helm.deploy(shell))?;
        self.step(report, Step::Watch, || kubectl.watch(shell))?;
        self.step(report, Step::Teardown, || {
            tiller.teardown();
            Ok(())
        })?;

        report.ok = true;
        dlog!("Deployment of {} complete", settings.deployment_name());
        Ok(())
    }

    /// Every command `run` would execute, in order, without running any.
    pub fn plan(&self, report: &mut RunReport) -> Result<Vec<CommandSpec>> {
        let settings = self.validate(report)?;
        let kubectl = Kubectl::new(&settings, self.config);
        let helm = Helm::new(&settings, self.config);

        let mut cmds = kubectl.login_commands();
        cmds.extend([
            helm.tiller(),
            helm.init_client(),
            helm.repo_update(),
            helm.lint_command(),
            helm.upgrade(),
            kubectl.rollout_status(&settings.watch_target()),
        ]);
        cmds.extend(kubectl.inspect_commands());
        report.ok = true;
        Ok(cmds)
    }
}

/// Binaries from `config` that cannot be found on `PATH`.
pub fn missing_binaries(config: &ToolConfig) -> Vec<String> {
    [config.kubectl_bin(), config.helm_bin(), config.tiller_bin()]
        .into_iter()
        .filter(|bin| which::which(bin).is_err())
        .map(String::from)
        .collect()
}

/// Validation plus a `PATH` check for the three binaries.
pub fn check(pipeline: &Pipeline, report: &mut RunReport) -> Result<()> {
    pipeline.validate(report)?;
    let missing = missing_binaries(pipeline.config);
    if !missing.is_empty() {
        return Err(Error::BinaryNotFound(missing.join(", ")));
    }
    report.ok = true;
    Ok(())
}
