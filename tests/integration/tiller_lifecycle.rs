//! Tiller is started once and stopped on every exit path.

use helm_deploy::config::ToolConfig;
use helm_deploy::runner::MockRunner;
use helm_deploy::{Error, Pipeline, RunReport, Step, StepStatus};

use crate::fixtures::TestProject;

#[test]
fn test_tiller_stopped_after_success() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[]);
    let config = ToolConfig::default();
    let runner = MockRunner::new();
    let pipeline = Pipeline::new(&env, &config, &runner, false);
    let mut report = RunReport::default();

    pipeline.run(&mut report).unwrap();

    assert_eq!(runner.spawned().len(), 1);
    assert_eq!(runner.terminated(), vec![MockRunner::PID]);
    assert_eq!(report.status_of(Step::Teardown), Some(StepStatus::Ok));
}

#[test]
fn test_tiller_that_dies_fails_init() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[]);
    let config = ToolConfig::default();
    let runner = MockRunner::new().with_dead_process();
    let pipeline = Pipeline::new(&env, &config, &runner, false);
    let mut report = RunReport::default();

    assert!(matches!(
        pipeline.run(&mut report),
        Err(Error::ProcessNotAlive { pid }) if pid == MockRunner::PID
    ));
    assert_eq!(report.failed_step(), Some(Step::InitHelm));
    assert!(!runner.ran("helm"));
}

#[test]
fn test_tiller_stopped_when_lint_fails() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[]);
    let config = ToolConfig::default();
    let runner = MockRunner::new().fail_on("helm lint", 1, "[ERROR] templates/: parse error");
    let pipeline = Pipeline::new(&env, &config, &runner, false);
    let mut report = RunReport::default();

    assert!(pipeline.run(&mut report).is_err());
    assert_eq!(runner.terminated(), vec![MockRunner::PID]);
    assert_eq!(report.status_of(Step::Teardown), None);
}

#[test]
fn test_tiller_stopped_when_rollout_fails() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[]);
    let config = ToolConfig::default();
    let runner = MockRunner::new().fail_on(
        "kubectl rollout status",
        1,
        "error: deployment \"production-shop\" exceeded its progress deadline",
    );
    let pipeline = Pipeline::new(&env, &config, &runner, false);
    let mut report = RunReport::default();

    assert!(matches!(
        pipeline.run(&mut report),
        Err(Error::CommandFailed { ref step, .. }) if step == "watch"
    ));
    assert_eq!(runner.terminated(), vec![MockRunner::PID]);
    assert_eq!(report.failed_step(), Some(Step::Watch));
}

#[test]
fn test_tiller_not_started_when_login_fails() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[]);
    let config = ToolConfig::default();
    let runner = MockRunner::new().fail_on("kubectl config use-context", 1, "no context");
    let pipeline = Pipeline::new(&env, &config, &runner, false);

    assert!(pipeline.run(&mut RunReport::default()).is_err());
    assert!(runner.spawned().is_empty());
    assert!(runner.terminated().is_empty());
}
