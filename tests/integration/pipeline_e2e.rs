//! End-to-end pipeline runs against a mock runner.

use helm_deploy::config::ToolConfig;
use helm_deploy::runner::MockRunner;
use helm_deploy::{Error, Pipeline, RunReport, Step, StepStatus};

use crate::fixtures::{TestProject, PRIVATE_REGISTRY};

#[test]
fn test_full_run_public_project() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[]);
    let config = ToolConfig::default();
    let runner = MockRunner::new().respond("kubectl get pods", "shop-7d9f 1/1 Running\n");
    let pipeline = Pipeline::new(&env, &config, &runner, false);
    let mut report = RunReport::default();

    pipeline.run(&mut report).unwrap();

    let chart = project.path.join("helm-chart").join("shop");
    let chart = chart.display();
    assert_eq!(
        runner.commands(),
        vec![
            "kubectl config set-cluster team-a-cluster --server=https://k8s.example.com".to_string(),
            "kubectl config set-credentials deployer --token=cluster-token".to_string(),
            "kubectl config set-context team-a-context --namespace=team-a --cluster=team-a-cluster --user=deployer".to_string(),
            "kubectl config use-context team-a-context".to_string(),
            "helm init --client-only".to_string(),
            "helm repo update".to_string(),
            format!("helm lint {}", chart),
            format!(
                "helm upgrade production-shop {} --install --recreate-pods --wait --namespace team-a \
                 --set image.repository=registry.example.com/team-a/shop --set image.tag=abc1234 \
                 --set environment=production --set commitSha=abc1234 --set gitRef=main --set jobId=1234",
                chart
            ),
            "kubectl rollout status deployment/production-shop -n team-a".to_string(),
            "kubectl get pods -n team-a -l jobId=1234".to_string(),
            "kubectl describe deployment -n team-a -l app=shop,environment=production,commitSha=abc1234".to_string(),
        ]
    );

    assert_eq!(runner.spawned(), vec!["tiller --storage=secret --listen=127.0.0.1:44134"]);
    assert_eq!(runner.terminated(), vec![MockRunner::PID]);

    assert!(report.ok);
    assert!(!report.dry_run);
    assert_eq!(report.deployment.as_deref(), Some("production-shop"));
    let steps: Vec<Step> = report.steps.iter().map(|r| r.step).collect();
    assert_eq!(
        steps,
        vec![
            Step::ValidateCore,
            Step::ValidateFallbacks,
            Step::ValidateDeployArgs,
            Step::ValidateLogin,
            Step::ValidateImagePull,
            Step::Login,
            Step::InitHelm,
            Step::Lint,
            Step::Deploy,
            Step::Watch,
            Step::Teardown,
        ]
    );
    assert!(report.steps.iter().all(|r| r.status == StepStatus::Ok));
}

#[test]
fn test_private_project_with_deploy_args() {
    let project = TestProject::new("shop");
    let mut overrides = PRIVATE_REGISTRY.to_vec();
    overrides.push(("PROJECT_SPECIFIC_DEPLOY_ARGS", "APP__TIMEOUT INGRESS__HOST"));
    overrides.push(("APP__TIMEOUT", "30"));
    overrides.push(("INGRESS__HOST", "shop.example.com"));
    let env = project.snapshot(&overrides);
    let config = ToolConfig::default();
    let runner = MockRunner::new();
    let pipeline = Pipeline::new(&env, &config, &runner, false);

    pipeline.run(&mut RunReport::default()).unwrap();

    let upgrade = runner
        .commands()
        .into_iter()
        .find(|c| c.starts_with("helm upgrade"))
        .unwrap();
    assert!(upgrade.ends_with(
        "--set jobId=1234 \
         --set imagePullSecret.registry=registry.example.com \
         --set imagePullSecret.username=gitlab+deploy-token-1 \
         --set imagePullSecret.password=pull-password \
         --set app.timeout=30 \
         --set ingress.host=shop.example.com"
    ));
}

#[test]
fn test_public_project_ignores_registry_credentials() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[
        ("CI_REGISTRY", "registry.example.com"),
        ("CI_DEPLOY_USER", "u"),
        ("CI_DEPLOY_PASSWORD", "p"),
    ]);
    let config = ToolConfig::default();
    let runner = MockRunner::new();
    let pipeline = Pipeline::new(&env, &config, &runner, false);

    pipeline.run(&mut RunReport::default()).unwrap();
    assert!(!runner
        .commands()
        .iter()
        .any(|c| c.contains("imagePullSecret")));
}

#[test]
fn test_private_project_without_credentials_fails_validation() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[("CI_PROJECT_VISIBILITY", "internal")]);
    let config = ToolConfig::default();
    let runner = MockRunner::new();
    let pipeline = Pipeline::new(&env, &config, &runner, false);
    let mut report = RunReport::default();

    match pipeline.run(&mut report) {
        Err(Error::MissingRequiredVariable { names }) => {
            assert_eq!(names, vec!["CI_REGISTRY", "CI_DEPLOY_USER", "CI_DEPLOY_PASSWORD"]);
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(report.failed_step(), Some(Step::ValidateImagePull));
    assert!(runner.commands().is_empty());
}

#[test]
fn test_missing_login_variable() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[("HELM_TOKEN", "")]);
    let config = ToolConfig::default();
    let runner = MockRunner::new();
    let pipeline = Pipeline::new(&env, &config, &runner, false);
    let mut report = RunReport::default();

    match pipeline.run(&mut report) {
        Err(Error::MissingRequiredVariable { names }) => assert_eq!(names, vec!["HELM_TOKEN"]),
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(report.failed_step(), Some(Step::ValidateLogin));
}

#[test]
fn test_login_failure_stops_pipeline() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[]);
    let config = ToolConfig::default();
    let runner = MockRunner::new().fail_on("kubectl config set-cluster", 1, "invalid server");
    let pipeline = Pipeline::new(&env, &config, &runner, false);
    let mut report = RunReport::default();

    assert!(matches!(
        pipeline.run(&mut report),
        Err(Error::CommandFailed { ref step, .. }) if step == "login"
    ));
    assert_eq!(runner.commands().len(), 1);
    assert!(runner.spawned().is_empty());
    assert_eq!(report.failed_step(), Some(Step::Login));
    assert_eq!(report.status_of(Step::InitHelm), None);
}

#[test]
fn test_deploy_failure_skips_watch() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[]);
    let config = ToolConfig::default();
    let runner = MockRunner::new().fail_on("helm upgrade", 1, "UPGRADE FAILED: timed out");
    let pipeline = Pipeline::new(&env, &config, &runner, false);
    let mut report = RunReport::default();

    match pipeline.run(&mut report) {
        Err(Error::CommandFailed { step, stderr, command, .. }) => {
            assert_eq!(step, "deploy");
            assert_eq!(stderr, "UPGRADE FAILED: timed out");
            assert!(command.contains("helm upgrade production-shop"));
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert!(!runner.ran("kubectl rollout"));
    assert_eq!(report.failed_step(), Some(Step::Deploy));
    assert!(!report.ok);
}

#[test]
fn test_environment_url_describes_service_and_route() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[("CI_ENVIRONMENT_URL", "https://shop.example.com")]);
    let config = ToolConfig::default();
    let runner = MockRunner::new();
    let pipeline = Pipeline::new(&env, &config, &runner, false);

    pipeline.run(&mut RunReport::default()).unwrap();

    let commands = runner.commands();
    let tail = &commands[commands.len() - 2..];
    assert_eq!(
        tail,
        &[
            "kubectl describe service -n team-a -l app=shop,environment=production,commitSha=abc1234".to_string(),
            "kubectl describe route -n team-a -l app=shop,environment=production,commitSha=abc1234".to_string(),
        ]
    );
}

#[test]
fn test_deployment_and_watch_overrides() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[("DEPLOYMENT_NAME", "shop-prod"), ("WATCH_DEPLOYMENT", "shop-web")]);
    let config = ToolConfig::default();
    let runner = MockRunner::new();
    let pipeline = Pipeline::new(&env, &config, &runner, false);
    let mut report = RunReport::default();

    pipeline.run(&mut report).unwrap();

    assert_eq!(report.deployment.as_deref(), Some("shop-prod"));
    assert!(runner.ran("helm upgrade shop-prod "));
    assert!(runner.ran("kubectl rollout status deployment/shop-web -n team-a"));
}

#[test]
fn test_fallbacks_from_ref_slug() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[("CI_ENVIRONMENT_NAME", ""), ("CI_ENVIRONMENT_SLUG", "")]);
    let config = ToolConfig::default();
    let runner = MockRunner::new();
    let pipeline = Pipeline::new(&env, &config, &runner, false);
    let mut report = RunReport::default();

    pipeline.run(&mut report).unwrap();

    assert_eq!(report.deployment.as_deref(), Some("main-shop"));
    assert!(runner
        .commands()
        .iter()
        .any(|c| c.starts_with("helm upgrade main-shop ") && c.contains("--set environment=main")));
}

#[test]
fn test_pauses_follow_config() {
    let project = TestProject::new("shop");
    let env = project.snapshot(&[]);
    let config = ToolConfig {
        tiller_startup_wait_secs: Some(1),
        post_rollout_pause_secs: Some(0),
        ..Default::default()
    };
    let runner = MockRunner::new();
    let pipeline = Pipeline::new(&env, &config, &runner, false);

    pipeline.run(&mut RunReport::default()).unwrap();

    // A zero pause is not slept at all.
    assert_eq!(runner.slept(), vec![std::time::Duration::from_secs(1)]);
}
