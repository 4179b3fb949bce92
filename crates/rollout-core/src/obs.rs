//! Structured observability hooks for deploy lifecycle events.
//!
//! This module provides:
//! - A deploy-scoped span ([`deploy_span`]) instrumenting each deploy future
//! - Emission functions for key lifecycle events: request rejection, start,
//!   stage completion and failure, revision registration, finish
//!
//! Events are emitted at `info!` level (rejections and stage failures at
//! `error!`).
//! Credentials never appear in any field.

use tracing::{error, info};

/// Span tagging every record of one deploy with its `deploy_id`.
///
/// Attach it with `tracing::Instrument`, never by entering it across an
/// `.await`.
pub fn deploy_span(deploy_id: &str) -> tracing::Span {
    tracing::info_span!("rollout.deploy", deploy_id = %deploy_id)
}

/// Emit event: deploy started for a service and family.
pub fn emit_deploy_started(deploy_id: &str, cluster: &str, service: &str, family: &str) {
    info!(
        event = "deploy.started",
        deploy_id = %deploy_id,
        cluster = %cluster,
        service = %service,
        family = %family,
    );
}

/// Emit event: the request failed validation before any stage ran.
pub fn emit_request_rejected(deploy_id: &str, error: &dyn std::fmt::Display) {
    error!(
        event = "deploy.request_rejected",
        deploy_id = %deploy_id,
        error = %error,
    );
}

/// Emit event: one pipeline stage completed.
pub fn emit_stage_completed(deploy_id: &str, stage: &str, duration_ms: u64) {
    info!(
        event = "deploy.stage_completed",
        deploy_id = %deploy_id,
        stage = %stage,
        duration_ms = duration_ms,
    );
}

/// Emit event: a pipeline stage failed; the remaining stages are skipped.
pub fn emit_stage_failed(deploy_id: &str, stage: &str, error: &dyn std::fmt::Display) {
    error!(
        event = "deploy.stage_failed",
        deploy_id = %deploy_id,
        stage = %stage,
        error = %error,
    );
}

/// Emit event: a new task definition revision was registered.
pub fn emit_revision_registered(deploy_id: &str, family: &str, task_definition_arn: &str) {
    info!(
        event = "deploy.revision_registered",
        deploy_id = %deploy_id,
        family = %family,
        task_definition_arn = %task_definition_arn,
    );
}

/// Emit event: deploy finished.
pub fn emit_deploy_finished(deploy_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "deploy.finished",
        deploy_id = %deploy_id,
        duration_ms = duration_ms,
        success = success,
    );
}
