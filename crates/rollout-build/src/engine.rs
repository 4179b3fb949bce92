//! Container engine abstraction.

use std::path::Path;

use async_trait::async_trait;

use crate::image::{ImageRef, LocalImage, ServiceHandle};
use crate::plan::BuildPlan;
use crate::Result;

/// Executes build plans and manages the resulting images.
///
/// Guarantees:
/// - `build` applies every step of the plan, in order, or fails.
/// - `publish` returns the reference under which the registry stored the
///   image.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Build `plan` with `context` as the source tree.
    async fn build(&self, plan: &BuildPlan, context: &Path) -> Result<LocalImage>;

    /// Push a built image to `registry`.
    async fn publish(&self, image: &LocalImage, registry: &str) -> Result<ImageRef>;

    /// Start a built image in the background, publishing `port` on the host.
    async fn serve(&self, image: &LocalImage, port: u16, args: &[String]) -> Result<ServiceHandle>;

    /// Stop a container started by `serve`.
    async fn stop(&self, handle: &ServiceHandle) -> Result<()>;
}
