use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use helm_deploy::config::ToolConfig;
use helm_deploy::env::EnvSnapshot;
use helm_deploy::runner::SystemRunner;
use helm_deploy::{dlog, dlog_debug, dlog_error, pipeline, Pipeline, Result, RunReport};

/// helm-deploy - deploy a Helm chart from a CI job
#[derive(Parser, Debug)]
#[command(name = "helm-deploy")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    \
    LOG_LEVEL=1..4              error, warn, debug, info\n    \
    DRY_RUN=1                   Log mutating commands instead of running them\n    \
    HELM_DEPLOY_CONFIG=PATH     Tool settings file (TOML)\n    \
    PROJECT_SPECIFIC_DEPLOY_ARGS=\"A__B C\"  Variables forwarded as --set a.b=... c=...")]
pub struct Cli {
    /// Log mutating commands instead of running them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// error, warn, debug or info (or 1-4); overrides LOG_LEVEL
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Tool settings file; overrides HELM_DEPLOY_CONFIG
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Validate, log in, init Helm, lint, deploy and watch the rollout (default)
    Run,

    /// Validate the environment and look for kubectl, helm and tiller on PATH
    Check,

    /// Print every command the run would execute, secrets masked
    Plan,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let env = EnvSnapshot::capture();

    helm_deploy::log::init(cli.log_level.as_deref().or(env.get("LOG_LEVEL")));

    match run(cli, &env) {
        Ok(code) => code,
        Err(e) => {
            dlog_error!("{}", e);
            ExitCode::from(1)
        }
    }
}

/// A failed step has already been logged by the report, so only a summary
/// is printed for it. Errors outside any step are returned.
fn run(cli: Cli, env: &EnvSnapshot) -> Result<ExitCode> {
    let config_path = cli
        .config
        .clone()
        .or_else(|| env.get("HELM_DEPLOY_CONFIG").map(PathBuf::from));
    let config = ToolConfig::load(config_path.as_deref())?;
    if let Some(path) = &config.log_file {
        helm_deploy::log::set_file(path.clone());
    }

    let dry_run = cli.dry_run || env.flag("DRY_RUN");
    dlog_debug!(
        "helm-deploy starting: command={:?} dry_run={} log_level={:?}",
        cli.command,
        dry_run,
        helm_deploy::log::get_level()
    );

    let runner = SystemRunner::new();
    let pipeline = Pipeline::new(env, &config, &runner, dry_run);
    let mut report = RunReport::default();

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => pipeline.run(&mut report),
        Command::Check => {
            let result = pipeline::check(&pipeline, &mut report);
            if result.is_ok() && !cli.json {
                dlog!("Environment and binaries look good");
            }
            result
        }
        Command::Plan => pipeline.plan(&mut report).map(|cmds| {
            if !cli.json {
                for cmd in cmds {
                    println!("{}", cmd);
                }
            }
        }),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    match (result, report.failed_step()) {
        (Ok(()), _) => Ok(ExitCode::SUCCESS),
        (Err(e), Some(_)) => {
            dlog_error!("{}", report.failure_summary().unwrap_or_else(|| e.to_string()));
            Ok(ExitCode::from(1))
        }
        (Err(e), None) => Err(e),
    }
}
