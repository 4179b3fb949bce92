//! Rollout Build - container image pipeline
//!
//! Provides the build side of a rollout:
//! - Composes a declarative build plan (base image, source tree, runtime,
//!   isolated dependency environment, dependencies)
//! - Executes it through a `ContainerEngine` (docker CLI in production)
//! - Publishes the result and returns its image reference, or runs it locally

pub mod config;
pub mod docker;
pub mod engine;
mod error;
pub mod fakes;
pub mod image;
pub mod pipeline;
pub mod plan;

// Re-export key types
pub use config::BuildConfig;
pub use docker::{CommandOutput, DockerEngine};
pub use engine::ContainerEngine;
pub use error::BuildError;
pub use image::{ImageRef, LocalImage, ServiceHandle};
pub use pipeline::{BuildPipeline, ImagePublisher};
pub use plan::{BuildPlan, BuildStep};

/// Result type for build operations
pub type Result<T> = std::result::Result<T, BuildError>;
