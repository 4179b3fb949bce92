//! AWS ECS backend
//!
//! Implements `TaskDefinitionService` on `aws-sdk-ecs`. The SDK's own
//! `TaskDefinition` is used as the revision body so nothing returned by
//! `DescribeTaskDefinition` is lost on the way back to
//! `RegisterTaskDefinition`.

use async_trait::async_trait;
use aws_sdk_ecs::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_ecs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ecs::types::{SortOrder, TaskDefinition as EcsTaskDefinition};
use aws_sdk_ecs::Client;
use tracing::{debug, info};

use crate::credentials::AwsCredentials;
use crate::error::ServiceError;
use crate::service_traits::*;

const PROVIDER_NAME: &str = "rollout";

/// ECS client for one deploy invocation.
#[derive(Debug, Clone)]
pub struct EcsService {
    client: Client,
    region: String,
}

impl EcsService {
    /// Build a client from explicit credentials. The credentials are moved
    /// into the SDK configuration and not kept anywhere else.
    pub fn new(credentials: AwsCredentials, region: &str) -> ServiceResult<Self> {
        if region.trim().is_empty() {
            return Err(ServiceError::InvalidConfig("region must not be empty".to_string()));
        }
        let sdk_credentials = Credentials::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            credentials.session_token().map(str::to_string),
            None,
            PROVIDER_NAME,
        );
        let temporary = credentials.has_session_token();
        drop(credentials);

        let config = aws_sdk_ecs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(sdk_credentials)
            .build();

        info!(region = %region, temporary_credentials = temporary, "ECS client configured");
        Ok(Self {
            client: Client::from_conf(config),
            region: region.to_string(),
        })
    }

    /// Wrap an already configured SDK client.
    pub fn from_client(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

fn sdk_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> ServiceError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let code = err.code().map(str::to_string);
    ServiceError::Rejected {
        operation,
        code,
        message: DisplayErrorContext(&err).to_string(),
    }
}

#[async_trait]
impl TaskDefinitionService for EcsService {
    type Body = EcsTaskDefinition;

    async fn latest_revision_arns(
        &self,
        family: &str,
        max_results: i32,
    ) -> ServiceResult<Vec<String>> {
        let output = self
            .client
            .list_task_definitions()
            .family_prefix(family)
            .sort(SortOrder::Desc)
            .max_results(max_results)
            .send()
            .await
            .map_err(|e| sdk_error("ListTaskDefinitions", e))?;

        let arns = output.task_definition_arns.unwrap_or_default();
        debug!(family = %family, found = arns.len(), "Listed task definitions");
        Ok(arns)
    }

    async fn describe(&self, task_definition_arn: &str) -> ServiceResult<EcsTaskDefinition> {
        let output = self
            .client
            .describe_task_definition()
            .task_definition(task_definition_arn)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeTaskDefinition", e))?;

        output.task_definition.ok_or(ServiceError::MissingField {
            operation: "DescribeTaskDefinition",
            field: "taskDefinition",
        })
    }

    async fn register(&self, body: &EcsTaskDefinition) -> ServiceResult<String> {
        let family = body.family.clone().ok_or(ServiceError::MissingField {
            operation: "RegisterTaskDefinition",
            field: "family",
        })?;

        let output = self
            .client
            .register_task_definition()
            .family(family)
            .set_container_definitions(Some(
                body.container_definitions.clone().unwrap_or_default(),
            ))
            .set_volumes(Some(body.volumes.clone().unwrap_or_default()))
            .set_task_role_arn(body.task_role_arn.clone())
            .set_execution_role_arn(body.execution_role_arn.clone())
            .set_network_mode(body.network_mode.clone())
            .set_requires_compatibilities(Some(
                body.requires_compatibilities.clone().unwrap_or_default(),
            ))
            .set_cpu(body.cpu.clone())
            .set_memory(body.memory.clone())
            .set_placement_constraints(body.placement_constraints.clone())
            .set_runtime_platform(body.runtime_platform.clone())
            .set_ephemeral_storage(body.ephemeral_storage.clone())
            .set_pid_mode(body.pid_mode.clone())
            .set_ipc_mode(body.ipc_mode.clone())
            .set_proxy_configuration(body.proxy_configuration.clone())
            .set_inference_accelerators(body.inference_accelerators.clone())
            .set_enable_fault_injection(body.enable_fault_injection)
            .send()
            .await
            .map_err(|e| sdk_error("RegisterTaskDefinition", e))?;

        output
            .task_definition
            .and_then(|td| td.task_definition_arn)
            .ok_or(ServiceError::MissingField {
                operation: "RegisterTaskDefinition",
                field: "taskDefinition.taskDefinitionArn",
            })
    }

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        task_definition_arn: &str,
    ) -> ServiceResult<()> {
        self.client
            .update_service()
            .cluster(cluster)
            .service(service)
            .task_definition(task_definition_arn)
            .send()
            .await
            .map_err(|e| sdk_error("UpdateService", e))?;
        Ok(())
    }
}

impl RevisionBody for EcsTaskDefinition {
    fn family_name(&self) -> &str {
        self.family.as_deref().unwrap_or_default()
    }

    fn revision_arn(&self) -> Option<&str> {
        self.task_definition_arn.as_deref()
    }

    fn container_images(&self) -> Vec<Option<&str>> {
        self.container_definitions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|c| c.image.as_deref())
            .collect()
    }

    fn with_image(&self, image: &str) -> Self {
        let mut next = self.clone();
        if let Some(containers) = next.container_definitions.as_mut() {
            for container in containers.iter_mut() {
                if container.image.is_some() {
                    container.image = Some(image.to_string());
                }
            }
        }
        next
    }
}

/// Connector producing an [`EcsService`] per deploy.
#[derive(Debug, Clone, Default)]
pub struct EcsConnector;

impl EcsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ServiceConnector for EcsConnector {
    type Service = EcsService;

    async fn connect(
        &self,
        credentials: AwsCredentials,
        region: &str,
    ) -> ServiceResult<EcsService> {
        EcsService::new(credentials, region)
    }
}
