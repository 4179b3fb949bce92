//! Linear stage pipeline.
//!
//! A `Pipeline` runs its stages strictly in order against one mutable
//! context and stops at the first error. There is no branching, retry or
//! rollback; a failure is logged with the stage name and returned as is.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::obs;

/// One step of a linear pipeline.
#[async_trait]
pub trait Stage<Ctx: Send>: Send + Sync {
    /// Stable stage name, used in logs and reports.
    fn name(&self) -> &str;

    async fn run(&self, ctx: &mut Ctx) -> Result<()>;
}

/// Timing of one completed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub duration_ms: u64,
}

/// Report of a fully successful pipeline execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Completed stages, in execution order.
    pub stages: Vec<StageTiming>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.stage.as_str()).collect()
    }
}

/// Ordered list of stages sharing a context of type `Ctx`.
pub struct Pipeline<'a, Ctx: Send> {
    run_id: String,
    stages: Vec<Box<dyn Stage<Ctx> + 'a>>,
}

impl<'a, Ctx: Send> Pipeline<'a, Ctx> {
    /// Empty pipeline; `run_id` tags its lifecycle events.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            stages: Vec::new(),
        }
    }

    /// Append a stage.
    pub fn stage(mut self, stage: impl Stage<Ctx> + 'a) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order. The first error aborts the run.
    pub async fn execute(&self, ctx: &mut Ctx) -> Result<PipelineReport> {
        let start = Instant::now();
        let mut report = PipelineReport::default();

        for stage in &self.stages {
            let stage_start = Instant::now();
            tracing::debug!(stage = %stage.name(), "Executing stage");

            if let Err(e) = stage.run(ctx).await {
                obs::emit_stage_failed(&self.run_id, stage.name(), &e);
                return Err(e);
            }

            let duration_ms = stage_start.elapsed().as_millis() as u64;
            obs::emit_stage_completed(&self.run_id, stage.name(), duration_ms);
            report.stages.push(StageTiming {
                stage: stage.name().to_string(),
                duration_ms,
            });
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;

    /// Stage that appends its name to the context and optionally fails.
    struct Mark {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl Stage<Vec<String>> for Mark {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, ctx: &mut Vec<String>) -> Result<()> {
            ctx.push(self.name.to_string());
            if self.fail {
                return Err(DeployError::InvalidRequest(format!("{} failed", self.name)));
            }
            Ok(())
        }
    }

    fn mark(name: &'static str, fail: bool) -> Mark {
        Mark { name, fail }
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let pipeline = Pipeline::new("run-1")
            .stage(mark("a", false))
            .stage(mark("b", false))
            .stage(mark("c", false));
        let mut seen = Vec::new();

        let report = pipeline.execute(&mut seen).await.unwrap();

        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(report.stage_names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failure_at_every_position_short_circuits() {
        let names = ["a", "b", "c", "d"];
        for failing in 0..names.len() {
            let mut pipeline = Pipeline::new("run-2");
            for (i, name) in names.iter().copied().enumerate() {
                pipeline = pipeline.stage(mark(name, i == failing));
            }
            let mut seen = Vec::new();

            let err = pipeline.execute(&mut seen).await.unwrap_err();

            assert_eq!(seen, names[..=failing].to_vec());
            assert!(err.to_string().contains(names[failing]));
        }
    }

    #[tokio::test]
    async fn test_empty_pipeline_succeeds() {
        let pipeline: Pipeline<'_, Vec<String>> = Pipeline::new("run-3");
        assert!(pipeline.is_empty());
        let report = pipeline.execute(&mut Vec::new()).await.unwrap();
        assert!(report.stages.is_empty());
    }
}
