//! In-memory container engine (testing only)
//!
//! `RecordingEngine` records every plan it is asked to build and every image
//! it publishes or serves, and can be told to fail at any operation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::engine::ContainerEngine;
use crate::error::BuildError;
use crate::image::{ImageRef, LocalImage, ServiceHandle};
use crate::plan::BuildPlan;
use crate::Result;

/// Engine operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOp {
    Build,
    Publish,
    Serve,
}

#[derive(Debug, Default)]
struct EngineState {
    builds: Vec<(BuildPlan, PathBuf)>,
    publishes: Vec<(String, String)>,
    served: Vec<ServiceHandle>,
    stopped: Vec<String>,
    fail_on: Option<EngineOp>,
}

/// Recording engine. Clones share state.
#[derive(Debug, Clone)]
pub struct RecordingEngine {
    published_ref: String,
    state: Arc<Mutex<EngineState>>,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::publishing("registry.local/app@sha256:0000")
    }

    /// Engine whose `publish` returns `reference`.
    pub fn publishing(reference: &str) -> Self {
        Self {
            published_ref: reference.to_string(),
            state: Arc::new(Mutex::new(EngineState::default())),
        }
    }

    pub fn fail_on(&self, op: EngineOp) {
        self.state.lock().unwrap().fail_on = Some(op);
    }

    /// Plans built so far, in order.
    pub fn built_plans(&self) -> Vec<BuildPlan> {
        self.state
            .lock()
            .unwrap()
            .builds
            .iter()
            .map(|(plan, _)| plan.clone())
            .collect()
    }

    /// (image id, registry) pairs published so far.
    pub fn publishes(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().publishes.clone()
    }

    pub fn served(&self) -> Vec<ServiceHandle> {
        self.state.lock().unwrap().served.clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.state.lock().unwrap().stopped.clone()
    }

    fn check(&self, op: EngineOp) -> Result<()> {
        if self.state.lock().unwrap().fail_on == Some(op) {
            return Err(BuildError::CommandFailed {
                step: format!("{:?}", op).to_lowercase(),
                exit_code: 1,
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    async fn build(&self, plan: &BuildPlan, context: &Path) -> Result<LocalImage> {
        self.check(EngineOp::Build)?;
        let mut state = self.state.lock().unwrap();
        state.builds.push((plan.clone(), context.to_path_buf()));
        Ok(LocalImage {
            id: format!("sha256:local{}", state.builds.len()),
            steps: plan.len(),
        })
    }

    async fn publish(&self, image: &LocalImage, registry: &str) -> Result<ImageRef> {
        self.check(EngineOp::Publish)?;
        self.state
            .lock()
            .unwrap()
            .publishes
            .push((image.id.clone(), registry.to_string()));
        ImageRef::parse(self.published_ref.clone())
    }

    async fn serve(
        &self,
        image: &LocalImage,
        port: u16,
        _args: &[String],
    ) -> Result<ServiceHandle> {
        self.check(EngineOp::Serve)?;
        let mut state = self.state.lock().unwrap();
        let handle = ServiceHandle {
            container_id: format!("container{}", state.served.len() + 1),
            image_id: image.id.clone(),
            port,
        };
        state.served.push(handle.clone());
        Ok(handle)
    }

    async fn stop(&self, handle: &ServiceHandle) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .stopped
            .push(handle.container_id.clone());
        Ok(())
    }
}
