//! Build configuration

use serde::{Deserialize, Serialize};

/// Default base image.
pub const DEFAULT_BASE_IMAGE: &str = "public.ecr.aws/docker/library/alpine:latest";
/// Default publish target.
pub const DEFAULT_REGISTRY: &str = "ttl.sh/ecsdemo-cicd";

/// Build and publish configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Image every build starts from
    pub base_image: String,
    /// Registry address images are published to
    pub registry: String,
    /// Working directory inside the image; the source tree lands here
    pub workdir: String,
    /// Location of the isolated dependency environment
    pub venv_path: String,
    /// Runtime packages installed with the base image's package manager
    pub runtime_packages: Vec<String>,
    /// Dependency manifest, relative to the source root
    pub manifest: String,
    /// Entrypoint script, relative to the source root
    pub entrypoint_script: String,
    /// Port exposed by `run`
    pub service_port: u16,
    /// Per-command timeout in seconds (0 disables it)
    pub timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            registry: DEFAULT_REGISTRY.to_string(),
            workdir: "/app".to_string(),
            venv_path: "/opt/venv".to_string(),
            runtime_packages: vec!["python3".to_string(), "py3-pip".to_string()],
            manifest: "requirements.txt".to_string(),
            entrypoint_script: "app.py".to_string(),
            service_port: 80,
            timeout_secs: 1800,
        }
    }
}

impl BuildConfig {
    /// Defaults overridden by `ROLLOUT_BASE_IMAGE`, `ROLLOUT_REGISTRY` and
    /// `ROLLOUT_TIMEOUT_SECS` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(image) = std::env::var("ROLLOUT_BASE_IMAGE") {
            config.base_image = image;
        }
        if let Ok(registry) = std::env::var("ROLLOUT_REGISTRY") {
            config.registry = registry;
        }
        if let Some(secs) = std::env::var("ROLLOUT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.timeout_secs = secs;
        }
        config
    }

    pub fn with_base_image(mut self, image: &str) -> Self {
        self.base_image = image.to_string();
        self
    }

    pub fn with_registry(mut self, registry: &str) -> Self {
        self.registry = registry.to_string();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Interpreter inside the dependency environment.
    pub fn venv_python(&self) -> String {
        format!("{}/bin/python3", self.venv_path)
    }

    /// Installer inside the dependency environment.
    pub fn venv_pip(&self) -> String {
        format!("{}/bin/pip3", self.venv_path)
    }

    /// Command that starts the application.
    pub fn app_command(&self) -> Vec<String> {
        vec![self.venv_python(), self.entrypoint_script.clone()]
    }
}
