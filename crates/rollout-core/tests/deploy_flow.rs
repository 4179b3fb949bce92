use rollout_build::fakes::{EngineOp, RecordingEngine};
use rollout_build::{BuildConfig, BuildPipeline, ImageRef};
use rollout_core::{DeployError, DeployRequest, Deployer, DEPLOY_STAGES};
use rollout_ecs::fakes::{MemoryConnector, MemoryTaskDefinitionService, Operation, ServiceCall};
use rollout_ecs::{
    ContainerDefinition, RevisionBody, SecretRefCredentials, ServiceError, StaticCredentials,
    TaskDefinition, Volume,
};
use serde_json::json;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const CLUSTER: &str = "prod";
const SERVICE: &str = "web";
const FAMILY: &str = "web-task";
const PUSHED: &str = "registry/app:sha123";

fn source_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();
    std::fs::write(dir.path().join("app.py"), "print('serving')\n").unwrap();
    dir
}

fn web_task() -> TaskDefinition {
    let mut volume = Volume {
        name: Some("scratch".to_string()),
        ..Volume::default()
    };
    volume.settings.insert("host".to_string(), json!({}));

    let mut body = TaskDefinition {
        task_role_arn: Some("arn:aws:iam::123456789012:role/web-task".to_string()),
        execution_role_arn: Some("arn:aws:iam::123456789012:role/ecs-exec".to_string()),
        network_mode: Some("awsvpc".to_string()),
        requires_compatibilities: vec!["FARGATE".to_string()],
        cpu: Some("256".to_string()),
        memory: Some("512".to_string()),
        volumes: vec![volume],
        ..TaskDefinition::new(FAMILY)
    }
    .with_container(
        ContainerDefinition::new("app")
            .with_image_ref("old:1.0")
            .with_setting("portMappings", json!([{"containerPort": 80}]))
            .with_setting("environment", json!([{"name": "MODE", "value": "prod"}])),
    )
    .with_container(ContainerDefinition::new("sidecar").with_setting("essential", json!(false)));
    body.extra
        .insert("runtimePlatform".to_string(), json!({"cpuArchitecture": "ARM64"}));
    body
}

/// Service with one revision of `web-task` and `prod/web` bound to it.
fn seeded_service() -> (MemoryTaskDefinitionService, String) {
    let service = MemoryTaskDefinitionService::new();
    let arn = service.seed_revision(web_task());
    service.seed_service(CLUSTER, SERVICE, &arn);
    (service, arn)
}

type TestDeployer = Deployer<BuildPipeline<RecordingEngine>, StaticCredentials, MemoryConnector>;

fn deployer(service: &MemoryTaskDefinitionService, engine: &RecordingEngine) -> TestDeployer {
    Deployer::new(
        BuildPipeline::new(engine.clone(), BuildConfig::default()),
        StaticCredentials::new("AKIAEXAMPLE", "secret", None),
        MemoryConnector::new(service.clone()),
    )
}

fn request(src: &TempDir) -> DeployRequest {
    DeployRequest::new(CLUSTER, SERVICE, FAMILY, "us-east-1").with_source(src.path())
}

fn has_orchestration_calls(service: &MemoryTaskDefinitionService) -> bool {
    !service.calls().is_empty()
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deploy_registers_one_revision_and_swaps_service() {
    let (service, first_arn) = seeded_service();
    let engine = RecordingEngine::publishing(PUSHED);
    let src = source_dir();

    let outcome = deployer(&service, &engine)
        .deploy(request(&src))
        .await
        .expect("deploy");

    let revisions = service.revisions(FAMILY);
    assert_eq!(revisions.len(), 2);
    let new_arn = revisions[1].task_definition_arn.clone().unwrap();

    assert_eq!(outcome.previous_arn, first_arn);
    assert_eq!(outcome.task_definition_arn, new_arn);
    assert_eq!(outcome.image.as_str(), PUSHED);
    assert_eq!(
        outcome.to_string(),
        format!("Service {} updated to use task definition {}", SERVICE, new_arn)
    );
    assert_eq!(service.bound_revision(CLUSTER, SERVICE), Some(new_arn));
    assert_eq!(outcome.report.stage_names(), DEPLOY_STAGES.to_vec());
}

#[tokio::test]
async fn derived_revision_differs_only_in_declared_images() {
    let (service, _) = seeded_service();
    let engine = RecordingEngine::publishing(PUSHED);
    let src = source_dir();

    deployer(&service, &engine)
        .deploy(request(&src))
        .await
        .expect("deploy");

    let revisions = service.revisions(FAMILY);
    let (old, new) = (&revisions[0], &revisions[1]);

    assert_eq!(new.container_images(), vec![Some(PUSHED), None]);
    assert_eq!(new.container_definitions[1].image, None);

    // Everything else is the fetched revision, verbatim.
    let expected = old.registration_body().with_image(PUSHED);
    assert_eq!(new.registration_body(), expected);
    assert_eq!(new.extra["runtimePlatform"], json!({"cpuArchitecture": "ARM64"}));
    assert_eq!(
        new.container_definitions[0].settings["portMappings"],
        json!([{"containerPort": 80}])
    );
}

#[tokio::test]
async fn deploy_calls_service_in_protocol_order() {
    let (service, first_arn) = seeded_service();
    let engine = RecordingEngine::publishing(PUSHED);
    let src = source_dir();

    let outcome = deployer(&service, &engine)
        .deploy(request(&src))
        .await
        .expect("deploy");

    let calls = service.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(
        calls[0],
        ServiceCall::ListTaskDefinitions {
            family: FAMILY.to_string(),
            max_results: 1
        }
    );
    assert_eq!(calls[1], ServiceCall::DescribeTaskDefinition { arn: first_arn });
    assert_eq!(calls[2].operation(), Operation::RegisterTaskDefinition);
    assert_eq!(
        calls[3],
        ServiceCall::UpdateService {
            cluster: CLUSTER.to_string(),
            service: SERVICE.to_string(),
            task_definition_arn: outcome.task_definition_arn.clone(),
        }
    );
}

#[tokio::test]
async fn repeated_deploys_append_distinct_revisions() {
    let (service, _) = seeded_service();
    let engine = RecordingEngine::publishing(PUSHED);
    let src = source_dir();
    let d = deployer(&service, &engine);

    let first = d.deploy(request(&src)).await.expect("first deploy");
    let second = d.deploy(request(&src)).await.expect("second deploy");

    assert_ne!(first.task_definition_arn, second.task_definition_arn);
    assert_ne!(first.deploy_id, second.deploy_id);
    assert_eq!(second.previous_arn, first.task_definition_arn);

    let revisions = service.revisions(FAMILY);
    assert_eq!(revisions.len(), 3);
    assert_eq!(revisions[1].container_images(), revisions[2].container_images());
    assert_eq!(
        service.bound_revision(CLUSTER, SERVICE),
        Some(second.task_definition_arn)
    );
}

#[tokio::test]
async fn supplied_image_skips_build() {
    let (service, _) = seeded_service();
    let engine = RecordingEngine::new();
    let supplied = ImageRef::parse("registry/app@sha256:feed").unwrap();

    let outcome = deployer(&service, &engine)
        .deploy(
            DeployRequest::new(CLUSTER, SERVICE, FAMILY, "us-east-1")
                .with_source("/nonexistent/source")
                .with_image(supplied.clone()),
        )
        .await
        .expect("deploy");

    assert_eq!(outcome.image, supplied);
    assert!(engine.built_plans().is_empty());
    assert_eq!(
        service.revisions(FAMILY)[1].container_images(),
        vec![Some("registry/app@sha256:feed"), None]
    );
}

// ---------------------------------------------------------------------------
// Failure paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_family_fails_before_any_mutation() {
    let service = MemoryTaskDefinitionService::new();
    let engine = RecordingEngine::publishing(PUSHED);
    let src = source_dir();

    let err = deployer(&service, &engine)
        .deploy(
            DeployRequest::new(CLUSTER, SERVICE, "missing-task", "us-east-1")
                .with_source(src.path()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::FamilyNotFound { ref family } if family == "missing-task"));
    assert_eq!(service.calls().len(), 1);
    assert_eq!(service.call_count(Operation::DescribeTaskDefinition), 0);
    assert_eq!(service.call_count(Operation::RegisterTaskDefinition), 0);
    assert_eq!(service.call_count(Operation::UpdateService), 0);
}

#[tokio::test]
async fn build_failure_makes_no_service_calls() {
    let (service, _) = seeded_service();
    let engine = RecordingEngine::new();
    engine.fail_on(EngineOp::Build);
    let src = source_dir();

    let err = deployer(&service, &engine)
        .deploy(request(&src))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Build(_)));
    assert!(!has_orchestration_calls(&service));
}

#[tokio::test]
async fn missing_source_is_a_build_failure() {
    let (service, _) = seeded_service();
    let engine = RecordingEngine::new();

    let err = deployer(&service, &engine)
        .deploy(
            DeployRequest::new(CLUSTER, SERVICE, FAMILY, "us-east-1")
                .with_source("/nonexistent/source"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Build(_)));
    assert!(engine.built_plans().is_empty());
    assert!(!has_orchestration_calls(&service));
}

#[tokio::test]
async fn registration_rejection_never_updates_service() {
    let (service, first_arn) = seeded_service();
    service.fail_on(
        Operation::RegisterTaskDefinition,
        ServiceError::rejected("RegisterTaskDefinition", "Invalid 'cpu' setting for task"),
    );
    let engine = RecordingEngine::publishing(PUSHED);
    let src = source_dir();

    let err = deployer(&service, &engine)
        .deploy(request(&src))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Registration { .. }));
    assert!(err.to_string().contains("Invalid 'cpu' setting for task"));
    assert_eq!(service.call_count(Operation::UpdateService), 0);
    assert_eq!(service.revisions(FAMILY).len(), 1);
    assert_eq!(service.bound_revision(CLUSTER, SERVICE), Some(first_arn));
}

#[tokio::test]
async fn service_update_failure_leaves_orphaned_revision() {
    let service = MemoryTaskDefinitionService::new();
    let first_arn = service.seed_revision(web_task());
    // No service seeded: UpdateService answers ServiceNotFoundException.
    let engine = RecordingEngine::publishing(PUSHED);
    let src = source_dir();

    let err = deployer(&service, &engine)
        .deploy(request(&src))
        .await
        .unwrap_err();

    match &err {
        DeployError::ServiceUpdate {
            cluster,
            service: svc,
            task_definition_arn,
            source,
        } => {
            assert_eq!(cluster, CLUSTER);
            assert_eq!(svc, SERVICE);
            assert_ne!(task_definition_arn, &first_arn);
            assert_eq!(source.code(), Some("ServiceNotFoundException"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.left_orphaned_revision());
    assert_eq!(service.revisions(FAMILY).len(), 2);
}

#[tokio::test]
async fn describe_failure_is_reported_with_arn() {
    let (service, first_arn) = seeded_service();
    service.fail_on(
        Operation::DescribeTaskDefinition,
        ServiceError::rejected("DescribeTaskDefinition", "throttled"),
    );
    let engine = RecordingEngine::publishing(PUSHED);
    let src = source_dir();

    let err = deployer(&service, &engine)
        .deploy(request(&src))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Describe { ref arn, .. } if *arn == first_arn));
    assert_eq!(service.call_count(Operation::RegisterTaskDefinition), 0);
}

#[tokio::test]
async fn connect_failure_stops_before_lookup() {
    let (service, _) = seeded_service();
    let engine = RecordingEngine::publishing(PUSHED);
    let src = source_dir();
    let d = Deployer::new(
        BuildPipeline::new(engine.clone(), BuildConfig::default()),
        StaticCredentials::new("AKIAEXAMPLE", "secret", None),
        MemoryConnector::failing(
            service.clone(),
            ServiceError::InvalidConfig("unknown region".to_string()),
        ),
    );

    let err = d.deploy(request(&src)).await.unwrap_err();

    assert!(matches!(err, DeployError::Connect(_)));
    assert!(!has_orchestration_calls(&service));
}

#[tokio::test]
async fn unresolvable_credentials_never_connect() {
    let (service, _) = seeded_service();
    let engine = RecordingEngine::publishing(PUSHED);
    let connector = MemoryConnector::new(service.clone());
    let src = source_dir();
    let d = Deployer::new(
        BuildPipeline::new(engine.clone(), BuildConfig::default()),
        SecretRefCredentials::parse("env:ROLLOUT_TEST_DEPLOY_UNSET_ACCESS_KEY", "secret", None),
        connector.clone(),
    );

    let err = d.deploy(request(&src)).await.unwrap_err();

    assert!(matches!(err, DeployError::Credentials(_)));
    assert!(connector.connected_regions().is_empty());
    assert!(!has_orchestration_calls(&service));
}

#[tokio::test]
async fn invalid_request_runs_no_stage() {
    let (service, _) = seeded_service();
    let engine = RecordingEngine::publishing(PUSHED);
    let src = source_dir();

    let err = deployer(&service, &engine)
        .deploy(DeployRequest::new("", SERVICE, FAMILY, "us-east-1").with_source(src.path()))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::InvalidRequest(_)));
    assert!(engine.built_plans().is_empty());
    assert!(!has_orchestration_calls(&service));
}

#[tokio::test]
async fn connector_receives_request_region() {
    let (service, _) = seeded_service();
    let engine = RecordingEngine::publishing(PUSHED);
    let connector = MemoryConnector::new(service.clone());
    let src = source_dir();
    let d = Deployer::new(
        BuildPipeline::new(engine, BuildConfig::default()),
        StaticCredentials::new("AKIAEXAMPLE", "secret", Some("token".to_string())),
        connector.clone(),
    );

    d.deploy(DeployRequest::new(CLUSTER, SERVICE, FAMILY, "eu-west-1").with_source(src.path()))
        .await
        .expect("deploy");

    assert_eq!(connector.connected_regions(), vec!["eu-west-1".to_string()]);
}
