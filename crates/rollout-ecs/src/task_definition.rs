//! Task definition value types
//!
//! JSON-shaped (camelCase) revision bodies. Attributes the rollout does not
//! interpret are carried verbatim in flattened property maps, so a derived
//! revision serializes to exactly the fetched document with only container
//! images changed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::service_traits::RevisionBody;

/// Attributes `DescribeTaskDefinition` returns that registration does not accept.
const RESPONSE_ONLY_KEYS: &[&str] = &[
    "compatibilities",
    "requiresAttributes",
    "registeredAt",
    "registeredBy",
    "deregisteredAt",
];

/// One container definition within a revision.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Ports, environment, log configuration and every other attribute.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl ContainerDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_image_ref(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }
}

/// A task volume.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

/// A full task definition revision.
///
/// `task_definition_arn`, `revision` and `status` are assigned by the
/// service and are never part of a registration body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub family: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_definition_arn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default)]
    pub container_definitions: Vec<ContainerDefinition>,

    #[serde(default)]
    pub volumes: Vec<Volume>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_role_arn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_role_arn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,

    #[serde(default)]
    pub requires_compatibilities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    /// Remaining registration inputs (placement constraints, runtime
    /// platform, ephemeral storage, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskDefinition {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            ..Self::default()
        }
    }

    pub fn with_container(mut self, container: ContainerDefinition) -> Self {
        self.container_definitions.push(container);
        self
    }

    /// Registration inputs only: the same revision with service-assigned
    /// attributes cleared.
    pub fn registration_body(&self) -> Self {
        let mut extra = self.extra.clone();
        for key in RESPONSE_ONLY_KEYS {
            extra.remove(*key);
        }
        Self {
            task_definition_arn: None,
            revision: None,
            status: None,
            extra,
            ..self.clone()
        }
    }
}

impl RevisionBody for TaskDefinition {
    fn family_name(&self) -> &str {
        &self.family
    }

    fn revision_arn(&self) -> Option<&str> {
        self.task_definition_arn.as_deref()
    }

    fn container_images(&self) -> Vec<Option<&str>> {
        self.container_definitions
            .iter()
            .map(|c| c.image.as_deref())
            .collect()
    }

    fn with_image(&self, image: &str) -> Self {
        let mut next = self.clone();
        for container in &mut next.container_definitions {
            if container.image.is_some() {
                container.image = Some(image.to_string());
            }
        }
        next
    }
}
