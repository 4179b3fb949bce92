//! Deploy orchestration: publish, revise, swap.
//!
//! A deploy is a [`Pipeline`] of seven stages over one [`DeployContext`]:
//!
//! 1. `publish_image`: build and push the image, or take the supplied one
//! 2. `connect`: resolve credentials once and build the service client
//! 3. `resolve_latest`: newest revision ARN of the family
//! 4. `fetch_definition`: full body of that revision
//! 5. `derive_revision`: copy with container images replaced
//! 6. `register_revision`: register the copy as a new revision
//! 7. `swap_service`: point the service at the new revision
//!
//! Any stage error aborts the rest. Nothing is retried or rolled back.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use rollout_build::{ImagePublisher, ImageRef};
use rollout_ecs::{CredentialProvider, RevisionBody, ServiceConnector, TaskDefinitionService};
use serde::Serialize;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::error::{DeployError, Result};
use crate::obs;
use crate::pipeline::{Pipeline, PipelineReport, Stage};

/// Stage names, in execution order.
pub const DEPLOY_STAGES: [&str; 7] = [
    "publish_image",
    "connect",
    "resolve_latest",
    "fetch_definition",
    "derive_revision",
    "register_revision",
    "swap_service",
];

/// What to deploy and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub cluster: String,
    pub service: String,
    pub family: String,
    pub region: String,

    /// Source directory built when no image is supplied.
    pub source: PathBuf,

    /// Already-published image; skips the build when set.
    pub image: Option<ImageRef>,
}

impl DeployRequest {
    pub fn new(
        cluster: impl Into<String>,
        service: impl Into<String>,
        family: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            service: service.into(),
            family: family.into(),
            region: region.into(),
            source: PathBuf::from("."),
            image: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }

    /// Reject requests with an empty target identifier.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("cluster", &self.cluster),
            ("service", &self.service),
            ("task definition family", &self.family),
            ("region", &self.region),
        ] {
            if value.trim().is_empty() {
                return Err(DeployError::InvalidRequest(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

/// State threaded through the deploy stages. Each stage fills one slot.
pub struct DeployContext<S: TaskDefinitionService> {
    pub request: DeployRequest,
    pub image: Option<ImageRef>,
    pub service: Option<S>,
    pub latest_arn: Option<String>,
    pub fetched: Option<S::Body>,
    pub derived: Option<S::Body>,
    pub registered_arn: Option<String>,
}

impl<S: TaskDefinitionService> DeployContext<S> {
    pub fn new(request: DeployRequest) -> Self {
        Self {
            request,
            image: None,
            service: None,
            latest_arn: None,
            fetched: None,
            derived: None,
            registered_arn: None,
        }
    }

    fn service(&self, stage: &'static str) -> Result<&S> {
        self.service.as_ref().ok_or(DeployError::MissingState {
            stage,
            missing: "a connected service",
        })
    }
}

fn required<'c, T>(
    slot: &'c Option<T>,
    stage: &'static str,
    missing: &'static str,
) -> Result<&'c T> {
    slot.as_ref().ok_or(DeployError::MissingState { stage, missing })
}

/// Successful deploy. `Display` is the confirmation line.
#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    pub deploy_id: String,
    pub cluster: String,
    pub service: String,
    pub family: String,
    pub image: ImageRef,

    /// Revision the new one was derived from.
    pub previous_arn: String,

    /// Newly registered revision the service now uses.
    pub task_definition_arn: String,

    pub report: PipelineReport,
}

impl fmt::Display for DeployOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Service {} updated to use task definition {}",
            self.service, self.task_definition_arn
        )
    }
}

/// Copy of `fetched` with every declared container image set to `image`.
pub fn derive_revision<B: RevisionBody>(fetched: &B, image: &ImageRef) -> B {
    fetched.with_image(image.as_str())
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Build and push the image unless the request already names one.
pub struct PublishImage<'a, P: ?Sized> {
    publisher: &'a P,
}

#[async_trait]
impl<'a, P, S> Stage<DeployContext<S>> for PublishImage<'a, P>
where
    P: ImagePublisher + ?Sized,
    S: TaskDefinitionService,
{
    fn name(&self) -> &str {
        DEPLOY_STAGES[0]
    }

    async fn run(&self, ctx: &mut DeployContext<S>) -> Result<()> {
        let image = match &ctx.request.image {
            Some(image) => {
                info!(image = %image, "Using supplied image, build skipped");
                image.clone()
            }
            None => self.publisher.publish_image(&ctx.request.source).await?,
        };
        ctx.image = Some(image);
        Ok(())
    }
}

/// Resolve credentials once and hand them to the connector by value.
pub struct Connect<'a, K: ?Sized, C> {
    credentials: &'a K,
    connector: &'a C,
}

#[async_trait]
impl<'a, K, C, S> Stage<DeployContext<S>> for Connect<'a, K, C>
where
    K: CredentialProvider + ?Sized,
    C: ServiceConnector<Service = S>,
    S: TaskDefinitionService,
{
    fn name(&self) -> &str {
        DEPLOY_STAGES[1]
    }

    async fn run(&self, ctx: &mut DeployContext<S>) -> Result<()> {
        let credentials = self.credentials.resolve().await?;
        info!(
            source = %self.credentials.source(),
            region = %ctx.request.region,
            "Credentials resolved"
        );

        let service = self
            .connector
            .connect(credentials, &ctx.request.region)
            .await
            .map_err(DeployError::Connect)?;
        ctx.service = Some(service);
        Ok(())
    }
}

/// Newest revision ARN of the family; an empty family is fatal.
pub struct ResolveLatest;

#[async_trait]
impl<S: TaskDefinitionService> Stage<DeployContext<S>> for ResolveLatest {
    fn name(&self) -> &str {
        DEPLOY_STAGES[2]
    }

    async fn run(&self, ctx: &mut DeployContext<S>) -> Result<()> {
        let family = ctx.request.family.clone();
        let arns = ctx
            .service(DEPLOY_STAGES[2])?
            .latest_revision_arns(&family, 1)
            .await
            .map_err(|source| DeployError::Lookup {
                family: family.clone(),
                source,
            })?;

        let latest = arns
            .into_iter()
            .next()
            .ok_or(DeployError::FamilyNotFound { family })?;
        info!(task_definition_arn = %latest, "Latest revision resolved");
        ctx.latest_arn = Some(latest);
        Ok(())
    }
}

/// Fetch the full body of the latest revision.
pub struct FetchDefinition;

#[async_trait]
impl<S: TaskDefinitionService> Stage<DeployContext<S>> for FetchDefinition {
    fn name(&self) -> &str {
        DEPLOY_STAGES[3]
    }

    async fn run(&self, ctx: &mut DeployContext<S>) -> Result<()> {
        let arn = required(&ctx.latest_arn, DEPLOY_STAGES[3], "a latest revision")?.clone();
        let body = ctx
            .service(DEPLOY_STAGES[3])?
            .describe(&arn)
            .await
            .map_err(|source| DeployError::Describe { arn, source })?;
        ctx.fetched = Some(body);
        Ok(())
    }
}

/// Substitute the published image into the fetched body.
pub struct DeriveRevision;

#[async_trait]
impl<S: TaskDefinitionService> Stage<DeployContext<S>> for DeriveRevision {
    fn name(&self) -> &str {
        DEPLOY_STAGES[4]
    }

    async fn run(&self, ctx: &mut DeployContext<S>) -> Result<()> {
        let fetched = required(&ctx.fetched, DEPLOY_STAGES[4], "a fetched revision")?;
        let image = required(&ctx.image, DEPLOY_STAGES[4], "an image reference")?;

        let images = fetched.container_images();
        let replaced = images.iter().filter(|i| i.is_some()).count();
        info!(
            containers = images.len(),
            replaced = replaced,
            image = %image,
            "Derived new revision"
        );

        let derived = derive_revision(fetched, image);
        ctx.derived = Some(derived);
        Ok(())
    }
}

/// Register the derived body as a new revision.
pub struct RegisterRevision;

#[async_trait]
impl<S: TaskDefinitionService> Stage<DeployContext<S>> for RegisterRevision {
    fn name(&self) -> &str {
        DEPLOY_STAGES[5]
    }

    async fn run(&self, ctx: &mut DeployContext<S>) -> Result<()> {
        let derived = required(&ctx.derived, DEPLOY_STAGES[5], "a derived revision")?;
        let arn = ctx
            .service(DEPLOY_STAGES[5])?
            .register(derived)
            .await
            .map_err(|source| DeployError::Registration {
                family: ctx.request.family.clone(),
                source,
            })?;
        ctx.registered_arn = Some(arn);
        Ok(())
    }
}

/// Point the service at the new revision.
pub struct SwapService;

#[async_trait]
impl<S: TaskDefinitionService> Stage<DeployContext<S>> for SwapService {
    fn name(&self) -> &str {
        DEPLOY_STAGES[6]
    }

    async fn run(&self, ctx: &mut DeployContext<S>) -> Result<()> {
        let arn = required(&ctx.registered_arn, DEPLOY_STAGES[6], "a registered revision")?;
        let request = &ctx.request;
        ctx.service(DEPLOY_STAGES[6])?
            .update_service(&request.cluster, &request.service, arn)
            .await
            .map_err(|source| DeployError::ServiceUpdate {
                cluster: request.cluster.clone(),
                service: request.service.clone(),
                task_definition_arn: arn.clone(),
                source,
            })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Deployer
// ---------------------------------------------------------------------------

/// Runs deploys against one publisher, credential source and connector.
pub struct Deployer<P, K, C> {
    publisher: P,
    credentials: K,
    connector: C,
}

impl<P, K, C> Deployer<P, K, C>
where
    P: ImagePublisher,
    K: CredentialProvider,
    C: ServiceConnector,
{
    pub fn new(publisher: P, credentials: K, connector: C) -> Self {
        Self {
            publisher,
            credentials,
            connector,
        }
    }

    /// The seven deploy stages, in order.
    pub fn pipeline(&self, deploy_id: &str) -> Pipeline<'_, DeployContext<C::Service>> {
        Pipeline::new(deploy_id)
            .stage(PublishImage {
                publisher: &self.publisher,
            })
            .stage(Connect {
                credentials: &self.credentials,
                connector: &self.connector,
            })
            .stage(ResolveLatest)
            .stage(FetchDefinition)
            .stage(DeriveRevision)
            .stage(RegisterRevision)
            .stage(SwapService)
    }

    /// Publish, register a new revision and swap the service onto it.
    pub async fn deploy(&self, request: DeployRequest) -> Result<DeployOutcome> {
        let deploy_id = Uuid::new_v4().to_string();
        let span = obs::deploy_span(&deploy_id);
        self.run(request, deploy_id).instrument(span).await
    }

    async fn run(&self, request: DeployRequest, deploy_id: String) -> Result<DeployOutcome> {
        if let Err(e) = request.validate() {
            obs::emit_request_rejected(&deploy_id, &e);
            return Err(e);
        }
        let start = Instant::now();
        obs::emit_deploy_started(&deploy_id, &request.cluster, &request.service, &request.family);

        let mut ctx = DeployContext::new(request);
        let report = match self.pipeline(&deploy_id).execute(&mut ctx).await {
            Ok(report) => report,
            Err(e) => {
                obs::emit_deploy_finished(&deploy_id, start.elapsed().as_millis() as u64, false);
                return Err(e);
            }
        };

        let outcome = Self::outcome(deploy_id, ctx, report)?;
        obs::emit_revision_registered(
            &outcome.deploy_id,
            &outcome.family,
            &outcome.task_definition_arn,
        );
        obs::emit_deploy_finished(&outcome.deploy_id, start.elapsed().as_millis() as u64, true);
        info!(%outcome, "Deploy complete");
        Ok(outcome)
    }

    fn outcome(
        deploy_id: String,
        ctx: DeployContext<C::Service>,
        report: PipelineReport,
    ) -> Result<DeployOutcome> {
        let missing = |what| DeployError::MissingState {
            stage: "deploy",
            missing: what,
        };
        Ok(DeployOutcome {
            deploy_id,
            image: ctx.image.ok_or_else(|| missing("an image reference"))?,
            previous_arn: ctx.latest_arn.ok_or_else(|| missing("a latest revision"))?,
            task_definition_arn: ctx
                .registered_arn
                .ok_or_else(|| missing("a registered revision"))?,
            cluster: ctx.request.cluster,
            service: ctx.request.service,
            family: ctx.request.family,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_build::fakes::RecordingEngine;
    use rollout_build::{BuildConfig, BuildPipeline};
    use rollout_ecs::fakes::{MemoryConnector, MemoryTaskDefinitionService};
    use rollout_ecs::{ContainerDefinition, StaticCredentials, TaskDefinition};
    use tracing_test::traced_test;

    fn image(s: &str) -> ImageRef {
        ImageRef::parse(s).unwrap()
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        assert!(DeployRequest::new("prod", "web", "web-task", "us-east-1")
            .validate()
            .is_ok());

        let err = DeployRequest::new("prod", " ", "web-task", "us-east-1")
            .validate()
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidRequest(ref m) if m.contains("service")));

        let err = DeployRequest::new("prod", "web", "web-task", "")
            .validate()
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidRequest(ref m) if m.contains("region")));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_rejected_request_is_logged() {
        let engine = RecordingEngine::publishing("registry/app:sha123");
        let deployer = Deployer::new(
            BuildPipeline::new(engine.clone(), BuildConfig::default()),
            StaticCredentials::new("AKIAEXAMPLE", "secret", None),
            MemoryConnector::new(MemoryTaskDefinitionService::new()),
        );

        let err = deployer
            .deploy(DeployRequest::new("", "web", "web-task", "us-east-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::InvalidRequest(_)));
        assert!(engine.built_plans().is_empty());
        assert!(logs_contain("deploy.request_rejected"));
        assert!(logs_contain("cluster must not be empty"));
        assert!(!logs_contain("deploy.started"));
    }

    #[test]
    fn test_derive_revision_skips_imageless_containers() {
        let fetched = TaskDefinition::new("web-task")
            .with_container(ContainerDefinition::new("app").with_image_ref("old:1.0"))
            .with_container(ContainerDefinition::new("sidecar"));

        let derived = derive_revision(&fetched, &image("registry/app:sha123"));

        assert_eq!(
            derived.container_images(),
            vec![Some("registry/app:sha123"), None]
        );
        assert_eq!(fetched.container_images(), vec![Some("old:1.0"), None]);
    }

    #[test]
    fn test_outcome_display_is_confirmation() {
        let outcome = DeployOutcome {
            deploy_id: "d-1".to_string(),
            cluster: "prod".to_string(),
            service: "web".to_string(),
            family: "web-task".to_string(),
            image: image("registry/app:sha123"),
            previous_arn: "arn:td/web-task:1".to_string(),
            task_definition_arn: "arn:td/web-task:2".to_string(),
            report: PipelineReport::default(),
        };
        assert_eq!(
            outcome.to_string(),
            "Service web updated to use task definition arn:td/web-task:2"
        );
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(DEPLOY_STAGES.first(), Some(&"publish_image"));
        assert_eq!(DEPLOY_STAGES.last(), Some(&"swap_service"));
    }
}
