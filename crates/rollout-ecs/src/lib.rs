//! Rollout-ECS: orchestration service layer for rollout
//!
//! This crate owns every call the rollout makes against the container
//! orchestration service, plus the credentials used to make them.
//!
//! ## Layer 0 - Orchestration service
//!
//! Focus: lossless revision bodies and an append-only view of revisions.
//!
//! ## Key Components
//!
//! - `TaskDefinitionService`: list / describe / register / update-service
//! - `RevisionBody`: immutable revision value with copy-with-new-image
//! - `EcsService`: `aws-sdk-ecs` backend
//! - `CredentialProvider`: scoped, redacted credential resolution

pub mod credentials;
mod ecs;
mod error;
pub mod fakes;
pub mod service_traits;
pub mod task_definition;

pub use credentials::{
    AwsCredentials, CredentialProvider, EnvCredentials, SecretRef, SecretRefCredentials,
    StaticCredentials,
};
pub use ecs::{EcsConnector, EcsService};
pub use error::{CredentialError, ServiceError};
pub use service_traits::{
    RevisionBody, ServiceConnector, ServiceResult, TaskDefinitionService,
};
pub use task_definition::{ContainerDefinition, TaskDefinition, Volume};

/// Result type for rollout-ecs operations
pub type Result<T> = std::result::Result<T, ServiceError>;
