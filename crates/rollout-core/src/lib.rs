//! Rollout Core Library
//!
//! Deploy orchestration on top of the build pipeline (`rollout-build`) and
//! the orchestration service layer (`rollout-ecs`):
//! - `Pipeline` / `Stage`: linear, short-circuiting stage execution
//! - `Deployer`: publish image, derive and register a new task definition
//!   revision, swap the service onto it
//! - `obs` / `telemetry`: lifecycle events and tracing setup

pub mod deploy;
pub mod error;
pub mod obs;
pub mod pipeline;
pub mod telemetry;

pub use deploy::{
    derive_revision, DeployContext, DeployOutcome, DeployRequest, Deployer, DEPLOY_STAGES,
};
pub use error::{DeployError, Result};
pub use obs::{
    deploy_span, emit_deploy_finished, emit_deploy_started, emit_request_rejected,
    emit_revision_registered, emit_stage_completed, emit_stage_failed,
};
pub use pipeline::{Pipeline, PipelineReport, Stage, StageTiming};
pub use telemetry::init_tracing;
