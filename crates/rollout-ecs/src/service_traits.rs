//! Service trait definitions for rollout
//!
//! These traits define the orchestration-service abstractions:
//! - `RevisionBody`: an immutable task definition revision value
//! - `TaskDefinitionService`: the four calls a rollout makes
//! - `ServiceConnector`: builds a service client from scoped credentials
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::fmt;

use async_trait::async_trait;

use crate::credentials::AwsCredentials;
use crate::error::ServiceError;

/// Result type for service operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

// ---------------------------------------------------------------------------
// RevisionBody - immutable task definition revision
// ---------------------------------------------------------------------------

/// A full task definition revision as returned by `describe`.
///
/// Guarantees:
/// - `with_image` never mutates `self`; it returns a full copy.
/// - In that copy every container that already declared an image points at
///   the new image. Containers without an image keep no image.
/// - All other attributes are carried over unchanged.
pub trait RevisionBody: Clone + fmt::Debug + Send + Sync + 'static {
    /// Family this revision belongs to.
    fn family_name(&self) -> &str;

    /// ARN of this revision, if it has been registered.
    fn revision_arn(&self) -> Option<&str>;

    /// Image of each container definition, in order.
    fn container_images(&self) -> Vec<Option<&str>>;

    /// Copy of this revision with every declared container image replaced.
    fn with_image(&self, image: &str) -> Self;
}

// ---------------------------------------------------------------------------
// TaskDefinitionService - orchestration service calls
// ---------------------------------------------------------------------------

/// Orchestration service consumed by a rollout.
///
/// Semantics:
/// - Revisions are append-only: `register` always creates a new revision.
/// - `update_service` is the only call that changes a running service.
#[async_trait]
pub trait TaskDefinitionService: Send + Sync {
    /// Revision representation understood by this backend.
    type Body: RevisionBody;

    /// ARNs for `family`, newest revision first, at most `max_results`.
    async fn latest_revision_arns(
        &self,
        family: &str,
        max_results: i32,
    ) -> ServiceResult<Vec<String>>;

    /// Fetch the full revision body for an ARN.
    async fn describe(&self, task_definition_arn: &str) -> ServiceResult<Self::Body>;

    /// Register `body` as a new revision and return its ARN.
    async fn register(&self, body: &Self::Body) -> ServiceResult<String>;

    /// Point `service` in `cluster` at `task_definition_arn`.
    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        task_definition_arn: &str,
    ) -> ServiceResult<()>;
}

// ---------------------------------------------------------------------------
// ServiceConnector - client construction
// ---------------------------------------------------------------------------

/// Builds a `TaskDefinitionService` from credentials resolved for one deploy.
///
/// Credentials are taken by value; connectors must not retain or log them
/// beyond handing them to the client.
#[async_trait]
pub trait ServiceConnector: Send + Sync {
    type Service: TaskDefinitionService;

    async fn connect(
        &self,
        credentials: AwsCredentials,
        region: &str,
    ) -> ServiceResult<Self::Service>;
}
