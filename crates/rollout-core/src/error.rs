//! Deploy error taxonomy.

use rollout_build::BuildError;
use rollout_ecs::{CredentialError, ServiceError};

/// Errors raised by a deploy invocation.
///
/// Every variant aborts the remaining stages. Nothing is rolled back: a
/// `ServiceUpdate` failure leaves the registered revision in place, unused.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid deploy request: {0}")]
    InvalidRequest(String),

    #[error("image build failed: {0}")]
    Build(#[from] BuildError),

    #[error("credential resolution failed: {0}")]
    Credentials(#[from] CredentialError),

    #[error("could not connect to orchestration service: {0}")]
    Connect(#[source] ServiceError),

    #[error("listing revisions of family {family} failed: {source}")]
    Lookup {
        family: String,
        #[source]
        source: ServiceError,
    },

    #[error("no task definition revisions found for family {family}")]
    FamilyNotFound { family: String },

    #[error("describing task definition {arn} failed: {source}")]
    Describe {
        arn: String,
        #[source]
        source: ServiceError,
    },

    #[error("registering new revision of family {family} failed: {source}")]
    Registration {
        family: String,
        #[source]
        source: ServiceError,
    },

    #[error(
        "updating service {service} in cluster {cluster} to {task_definition_arn} failed: {source}"
    )]
    ServiceUpdate {
        cluster: String,
        service: String,
        task_definition_arn: String,
        #[source]
        source: ServiceError,
    },

    #[error("stage {stage} ran without {missing}")]
    MissingState {
        stage: &'static str,
        missing: &'static str,
    },
}

impl DeployError {
    /// Whether the orchestration service was mutated before the failure.
    pub fn left_orphaned_revision(&self) -> bool {
        matches!(self, DeployError::ServiceUpdate { .. })
    }
}

/// Result type for deploy operations.
pub type Result<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_not_found_display() {
        let err = DeployError::FamilyNotFound {
            family: "web-task".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no task definition revisions found for family web-task"
        );
    }

    #[test]
    fn test_registration_surfaces_rejection_reason() {
        let err = DeployError::Registration {
            family: "web-task".to_string(),
            source: ServiceError::rejected("RegisterTaskDefinition", "Invalid memory value"),
        };
        assert!(err.to_string().contains("Invalid memory value"));
        assert!(!err.left_orphaned_revision());
    }

    #[test]
    fn test_service_update_leaves_orphan() {
        let err = DeployError::ServiceUpdate {
            cluster: "prod".to_string(),
            service: "web".to_string(),
            task_definition_arn: "arn:td:2".to_string(),
            source: ServiceError::rejected("UpdateService", "throttled"),
        };
        assert!(err.left_orphaned_revision());
        assert!(err.to_string().contains("arn:td:2"));
    }
}
