//! Error types for rollout-build

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building, publishing or running an image
#[derive(Error, Debug)]
pub enum BuildError {
    /// Source directory or a required file in it is missing
    #[error("Source missing at {path:?}: {what}")]
    SourceMissing { path: PathBuf, what: String },

    /// Engine executable could not be started
    #[error("Failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    /// A build step or engine command exited non-zero
    #[error("Step '{step}' failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        step: String,
        exit_code: i32,
        stderr: String,
    },

    /// A build step did not finish in time
    #[error("Step '{step}' timed out after {timeout_secs} seconds")]
    Timeout { step: String, timeout_secs: u64 },

    /// Engine produced something that is not a usable image reference
    #[error("Invalid image reference: {0:?}")]
    InvalidImageRef(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
