//! Build, publish and run pipeline.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::BuildConfig;
use crate::engine::ContainerEngine;
use crate::error::BuildError;
use crate::image::{ImageRef, LocalImage, ServiceHandle};
use crate::plan::{BuildPlan, BuildStep};
use crate::Result;

/// Anything that can turn a source directory into a published image.
#[async_trait]
pub trait ImagePublisher: Send + Sync {
    async fn publish_image(&self, source: &Path) -> Result<ImageRef>;
}

/// Build pipeline: one base plan, extended for publishing or local runs.
///
/// `push` and `run` always build the complete base plan first; their extra
/// step is appended to a copy, never to the base plan itself.
pub struct BuildPipeline<E> {
    engine: E,
    config: BuildConfig,
}

impl<E: ContainerEngine> BuildPipeline<E> {
    pub fn new(engine: E, config: BuildConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Plan behind `build`.
    pub fn base_plan(&self) -> BuildPlan {
        BuildPlan::application(&self.config)
    }

    /// Plan behind `push`: the base plan plus the runtime entrypoint.
    pub fn publish_plan(&self) -> BuildPlan {
        self.base_plan()
            .extended(BuildStep::Entrypoint(self.config.app_command()))
    }

    /// Plan behind `run`: the base plan plus the exposed service port.
    pub fn run_plan(&self) -> BuildPlan {
        self.base_plan()
            .extended(BuildStep::ExposePort(self.config.service_port))
    }

    /// The source directory must exist and carry the manifest and the
    /// entrypoint script.
    pub fn validate_source(&self, source: &Path) -> Result<()> {
        if !source.is_dir() {
            return Err(BuildError::SourceMissing {
                path: source.to_path_buf(),
                what: "source directory".to_string(),
            });
        }
        for required in [&self.config.manifest, &self.config.entrypoint_script] {
            if !source.join(required).is_file() {
                return Err(BuildError::SourceMissing {
                    path: source.to_path_buf(),
                    what: required.clone(),
                });
            }
        }
        Ok(())
    }

    async fn build_plan(&self, plan: &BuildPlan, source: &Path) -> Result<LocalImage> {
        self.validate_source(source)?;
        let start = Instant::now();
        info!(
            engine = %self.engine.name(),
            source = %source.display(),
            steps = plan.len(),
            "Building image"
        );

        let image = self.engine.build(plan, source).await.map_err(|e| {
            error!(source = %source.display(), error = %e, "Image build failed");
            e
        })?;

        info!(
            image_id = %image.id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Build complete"
        );
        Ok(image)
    }

    /// Build the dependency-installed image.
    pub async fn build(&self, source: &Path) -> Result<LocalImage> {
        self.build_plan(&self.base_plan(), source).await
    }

    /// Build with entrypoint and publish to the configured registry.
    pub async fn push(&self, source: &Path) -> Result<ImageRef> {
        let image = self.build_plan(&self.publish_plan(), source).await?;
        let reference = self
            .engine
            .publish(&image, &self.config.registry)
            .await
            .map_err(|e| {
                error!(registry = %self.config.registry, error = %e, "Image publish failed");
                e
            })?;
        info!(image = %reference, "Image pushed");
        Ok(reference)
    }

    /// Build with the exposed port and start it as a local service.
    pub async fn run(&self, source: &Path) -> Result<ServiceHandle> {
        let image = self.build_plan(&self.run_plan(), source).await?;
        self.engine
            .serve(&image, self.config.service_port, &self.config.app_command())
            .await
    }

    /// Stop a service started by `run`.
    pub async fn stop(&self, handle: &ServiceHandle) -> Result<()> {
        self.engine.stop(handle).await
    }
}

#[async_trait]
impl<E: ContainerEngine> ImagePublisher for BuildPipeline<E> {
    async fn publish_image(&self, source: &Path) -> Result<ImageRef> {
        self.push(source).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingEngine;

    fn pipeline() -> BuildPipeline<RecordingEngine> {
        BuildPipeline::new(RecordingEngine::new(), BuildConfig::default())
    }

    #[test]
    fn test_publish_plan_appends_entrypoint() {
        let p = pipeline();
        let plan = p.publish_plan();
        assert_eq!(plan.len(), 7);
        assert_eq!(
            plan.steps().last(),
            Some(&BuildStep::Entrypoint(vec![
                "/opt/venv/bin/python3".to_string(),
                "app.py".to_string()
            ]))
        );
    }

    #[test]
    fn test_run_plan_exposes_port_80() {
        let p = pipeline();
        assert_eq!(p.run_plan().steps().last(), Some(&BuildStep::ExposePort(80)));
        assert_eq!(p.base_plan().len(), 6);
    }

    #[test]
    fn test_validate_source_requires_manifest_and_script() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline();

        let err = p.validate_source(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            BuildError::SourceMissing { ref what, .. } if what == "requirements.txt"
        ));

        std::fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();
        let err = p.validate_source(dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::SourceMissing { ref what, .. } if what == "app.py"));

        std::fs::write(dir.path().join("app.py"), "print('hi')\n").unwrap();
        assert!(p.validate_source(dir.path()).is_ok());
    }
}
