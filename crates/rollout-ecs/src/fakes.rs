//! In-memory fakes for service traits (testing only)
//!
//! Provides `MemoryTaskDefinitionService` and `MemoryConnector` that satisfy
//! the trait contracts without any external dependencies. Every call is
//! recorded so tests can assert on exactly which operations a rollout made.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::credentials::AwsCredentials;
use crate::error::ServiceError;
use crate::service_traits::*;
use crate::task_definition::TaskDefinition;

const FAKE_ACCOUNT: &str = "123456789012";

/// Operation names, matching the orchestration service API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListTaskDefinitions,
    DescribeTaskDefinition,
    RegisterTaskDefinition,
    UpdateService,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ListTaskDefinitions => "ListTaskDefinitions",
            Operation::DescribeTaskDefinition => "DescribeTaskDefinition",
            Operation::RegisterTaskDefinition => "RegisterTaskDefinition",
            Operation::UpdateService => "UpdateService",
        }
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCall {
    ListTaskDefinitions { family: String, max_results: i32 },
    DescribeTaskDefinition { arn: String },
    RegisterTaskDefinition { body: TaskDefinition },
    UpdateService {
        cluster: String,
        service: String,
        task_definition_arn: String,
    },
}

impl ServiceCall {
    pub fn operation(&self) -> Operation {
        match self {
            ServiceCall::ListTaskDefinitions { .. } => Operation::ListTaskDefinitions,
            ServiceCall::DescribeTaskDefinition { .. } => Operation::DescribeTaskDefinition,
            ServiceCall::RegisterTaskDefinition { .. } => Operation::RegisterTaskDefinition,
            ServiceCall::UpdateService { .. } => Operation::UpdateService,
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryTaskDefinitionService
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ServiceState {
    /// family → revisions, oldest first (append-only)
    families: HashMap<String, Vec<TaskDefinition>>,
    /// (cluster, service) → bound task definition ARN
    services: HashMap<(String, String), String>,
    calls: Vec<ServiceCall>,
    failures: HashMap<Operation, ServiceError>,
}

/// In-memory orchestration service. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryTaskDefinitionService {
    region: String,
    state: Arc<Mutex<ServiceState>>,
}

impl Default for MemoryTaskDefinitionService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTaskDefinitionService {
    pub fn new() -> Self {
        Self::with_region("us-east-1")
    }

    pub fn with_region(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state: Arc::new(Mutex::new(ServiceState::default())),
        }
    }

    fn arn_for(&self, family: &str, revision: i32) -> String {
        format!(
            "arn:aws:ecs:{}:{}:task-definition/{}:{}",
            self.region, FAKE_ACCOUNT, family, revision
        )
    }

    /// Seed a revision as if it had been registered earlier. Returns its ARN.
    pub fn seed_revision(&self, body: TaskDefinition) -> String {
        let mut state = self.state.lock().unwrap();
        self.append_revision(&mut state, body)
    }

    /// Seed a running service bound to `task_definition_arn`.
    pub fn seed_service(&self, cluster: &str, service: &str, task_definition_arn: &str) {
        let mut state = self.state.lock().unwrap();
        state.services.insert(
            (cluster.to_string(), service.to_string()),
            task_definition_arn.to_string(),
        );
    }

    /// Make every subsequent call to `operation` fail with `error`.
    pub fn fail_on(&self, operation: Operation, error: ServiceError) {
        let mut state = self.state.lock().unwrap();
        state.failures.insert(operation, error);
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// All revisions of `family`, oldest first.
    pub fn revisions(&self, family: &str) -> Vec<TaskDefinition> {
        self.state
            .lock()
            .unwrap()
            .families
            .get(family)
            .cloned()
            .unwrap_or_default()
    }

    /// ARN the service is currently bound to.
    pub fn bound_revision(&self, cluster: &str, service: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .services
            .get(&(cluster.to_string(), service.to_string()))
            .cloned()
    }

    fn append_revision(&self, state: &mut ServiceState, body: TaskDefinition) -> String {
        let revisions = state.families.entry(body.family.clone()).or_default();
        let revision = revisions.len() as i32 + 1;
        let arn = self.arn_for(&body.family, revision);
        revisions.push(TaskDefinition {
            task_definition_arn: Some(arn.clone()),
            revision: Some(revision),
            status: Some("ACTIVE".to_string()),
            ..body
        });
        arn
    }

    fn record(&self, call: ServiceCall) -> ServiceResult<std::sync::MutexGuard<'_, ServiceState>> {
        let mut state = self.state.lock().unwrap();
        let operation = call.operation();
        state.calls.push(call);
        if let Some(err) = state.failures.get(&operation) {
            return Err(err.clone());
        }
        Ok(state)
    }
}

#[async_trait]
impl TaskDefinitionService for MemoryTaskDefinitionService {
    type Body = TaskDefinition;

    async fn latest_revision_arns(
        &self,
        family: &str,
        max_results: i32,
    ) -> ServiceResult<Vec<String>> {
        let state = self.record(ServiceCall::ListTaskDefinitions {
            family: family.to_string(),
            max_results,
        })?;
        let arns = state
            .families
            .get(family)
            .map(|revisions| {
                revisions
                    .iter()
                    .rev()
                    .take(max_results.max(0) as usize)
                    .filter_map(|r| r.task_definition_arn.clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(arns)
    }

    async fn describe(&self, task_definition_arn: &str) -> ServiceResult<TaskDefinition> {
        let state = self.record(ServiceCall::DescribeTaskDefinition {
            arn: task_definition_arn.to_string(),
        })?;
        state
            .families
            .values()
            .flatten()
            .find(|r| r.task_definition_arn.as_deref() == Some(task_definition_arn))
            .cloned()
            .ok_or_else(|| ServiceError::Rejected {
                operation: Operation::DescribeTaskDefinition.name(),
                code: Some("ClientException".to_string()),
                message: "Unable to describe task definition.".to_string(),
            })
    }

    async fn register(&self, body: &TaskDefinition) -> ServiceResult<String> {
        let registration = body.registration_body();
        let mut state = self.record(ServiceCall::RegisterTaskDefinition {
            body: registration.clone(),
        })?;
        if registration.family.is_empty() || registration.container_definitions.is_empty() {
            return Err(ServiceError::Rejected {
                operation: Operation::RegisterTaskDefinition.name(),
                code: Some("ClientException".to_string()),
                message: "family and containerDefinitions are required".to_string(),
            });
        }
        Ok(self.append_revision(&mut state, registration))
    }

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        task_definition_arn: &str,
    ) -> ServiceResult<()> {
        let mut state = self.record(ServiceCall::UpdateService {
            cluster: cluster.to_string(),
            service: service.to_string(),
            task_definition_arn: task_definition_arn.to_string(),
        })?;
        match state
            .services
            .get_mut(&(cluster.to_string(), service.to_string()))
        {
            Some(bound) => {
                *bound = task_definition_arn.to_string();
                Ok(())
            }
            None => Err(ServiceError::Rejected {
                operation: Operation::UpdateService.name(),
                code: Some("ServiceNotFoundException".to_string()),
                message: format!("Service not found: {}/{}", cluster, service),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryConnector
// ---------------------------------------------------------------------------

/// Connector that hands out a shared `MemoryTaskDefinitionService`.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    service: MemoryTaskDefinitionService,
    failure: Option<ServiceError>,
    connects: Arc<Mutex<Vec<String>>>,
}

impl MemoryConnector {
    pub fn new(service: MemoryTaskDefinitionService) -> Self {
        Self {
            service,
            failure: None,
            connects: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Connector whose `connect` always fails.
    pub fn failing(service: MemoryTaskDefinitionService, error: ServiceError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(service)
        }
    }

    /// Regions passed to `connect`, in call order.
    pub fn connected_regions(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServiceConnector for MemoryConnector {
    type Service = MemoryTaskDefinitionService;

    async fn connect(
        &self,
        _credentials: AwsCredentials,
        region: &str,
    ) -> ServiceResult<MemoryTaskDefinitionService> {
        self.connects.lock().unwrap().push(region.to_string());
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(self.service.clone())
    }
}
