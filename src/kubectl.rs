use crate::config::ToolConfig;
use crate::runner::CommandSpec;
use crate::settings::Settings;
use crate::shell::Shell;
use crate::{dlog, Result};

/// `kubectl` invocations for cluster login and rollout watching.
pub struct Kubectl<'a> {
    settings: &'a Settings,
    config: &'a ToolConfig,
}

impl<'a> Kubectl<'a> {
    pub fn new(settings: &'a Settings, config: &'a ToolConfig) -> Self {
        Self { settings, config }
    }

    fn cmd(&self) -> CommandSpec {
        CommandSpec::new(self.config.kubectl_bin())
    }

    pub fn set_cluster(&self) -> CommandSpec {
        let mut cmd = self.cmd().args([
            "config".to_string(),
            "set-cluster".to_string(),
            self.settings.cluster_name(),
            format!("--server={}", self.settings.cluster_server),
        ]);
        if let Some(ca) = &self.config.certificate_authority {
            cmd = cmd.arg(format!("--certificate-authority={}", ca));
        }
        if self.config.insecure_skip_tls_verify {
            cmd = cmd.arg("--insecure-skip-tls-verify=true");
        }
        cmd
    }

    pub fn set_credentials(&self) -> CommandSpec {
        self.cmd()
            .args(["config", "set-credentials", self.settings.helm_user.as_str()])
            .secret_arg(format!("--token={}", self.settings.helm_token))
    }

    pub fn set_context(&self) -> CommandSpec {
        self.cmd().args([
            "config".to_string(),
            "set-context".to_string(),
            self.settings.context_name(),
            format!("--namespace={}", self.settings.namespace),
            format!("--cluster={}", self.settings.cluster_name()),
            format!("--user={}", self.settings.helm_user),
        ])
    }

    pub fn use_context(&self) -> CommandSpec {
        self.cmd()
            .args(["config".to_string(), "use-context".to_string(), self.settings.context_name()])
    }

    pub fn login_commands(&self) -> Vec<CommandSpec> {
        vec![
            self.set_cluster(),
            self.set_credentials(),
            self.set_context(),
            self.use_context(),
        ]
    }

    /// Configure and activate the deploy context. Stops at the first failure.
    pub fn login(&self, shell: &Shell) -> Result<()> {
        dlog!(
            "Logging into {} as {} (namespace {})",
            self.settings.cluster_server,
            self.settings.helm_user,
            self.settings.namespace
        );
        for cmd in self.login_commands() {
            shell.run("login", &cmd)?;
        }
        Ok(())
    }

    pub fn rollout_status(&self, deployment: &str) -> CommandSpec {
        let mut cmd = self.cmd().args([
            "rollout".to_string(),
            "status".to_string(),
            format!("deployment/{}", deployment),
            "-n".to_string(),
            self.settings.namespace.clone(),
        ]);
        if let Some(secs) = self.config.rollout_timeout_secs {
            cmd = cmd.arg(format!("--timeout={}s", secs));
        }
        cmd
    }

    fn describe(&self, kind: &str) -> CommandSpec {
        self.cmd().args([
            "describe".to_string(),
            kind.to_string(),
            "-n".to_string(),
            self.settings.namespace.clone(),
            "-l".to_string(),
            self.settings.release_selector(),
        ])
    }

    /// Commands run once the rollout has settled.
    pub fn inspect_commands(&self) -> Vec<CommandSpec> {
        let mut cmds = vec![
            self.cmd().args([
                "get".to_string(),
                "pods".to_string(),
                "-n".to_string(),
                self.settings.namespace.clone(),
                "-l".to_string(),
                format!("jobId={}", self.settings.job_id),
            ]),
            self.describe("deployment"),
        ];
        if self.settings.environment_url.is_some() {
            cmds.push(self.describe("service"));
            cmds.push(self.describe("route"));
        }
        cmds
    }

    /// Block until the rollout settles, then print what was deployed.
    pub fn watch(&self, shell: &Shell) -> Result<()> {
        let target = self.settings.watch_target();
        dlog!("Watching rollout of deployment/{}", target);
        shell.run_echo("watch", &self.rollout_status(&target))?;
        shell.pause(self.config.post_rollout_pause());
        for cmd in self.inspect_commands() {
            shell.run_echo("watch", &cmd)?;
        }
        if let Some(url) = &self.settings.environment_url {
            dlog!("Environment available at {}", url);
        }
        Ok(())
    }
}
