//! Image handles produced by the build pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::Result;

/// Published image reference (registry + tag or digest).
///
/// Opaque to everything downstream; only non-empty, whitespace-free strings
/// are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageRef(String);

impl ImageRef {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(BuildError::InvalidImageRef(raw));
        }
        Ok(ImageRef(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digest part (`sha256:...`) when the reference is pinned by digest.
    pub fn digest(&self) -> Option<&str> {
        self.0.split_once('@').map(|(_, digest)| digest)
    }
}

impl TryFrom<String> for ImageRef {
    type Error = BuildError;

    fn try_from(s: String) -> Result<Self> {
        ImageRef::parse(s)
    }
}

impl From<ImageRef> for String {
    fn from(r: ImageRef) -> Self {
        r.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An image built locally by an engine, not yet published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    /// Engine-specific image id.
    pub id: String,
    /// Number of plan steps applied.
    pub steps: usize,
}

/// A container started for local use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    pub container_id: String,
    pub image_id: String,
    pub port: u16,
}

impl ServiceHandle {
    /// Local address the service listens on.
    pub fn endpoint(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}
