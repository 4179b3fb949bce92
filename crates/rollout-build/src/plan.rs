//! Build step definitions and plans.

use serde::{Deserialize, Serialize};

use crate::config::BuildConfig;

/// A single declarative image build step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildStep {
    /// Start from a base image.
    From(String),

    /// Set the working directory.
    Workdir(String),

    /// Copy the full source tree to `dest`.
    CopySource { dest: String },

    /// Run a command (exec form) inside the image.
    Exec(Vec<String>),

    /// Set the runtime entrypoint.
    Entrypoint(Vec<String>),

    /// Declare a listening port.
    ExposePort(u16),
}

impl BuildStep {
    /// Short step name, used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            BuildStep::From(_) => "from",
            BuildStep::Workdir(_) => "workdir",
            BuildStep::CopySource { .. } => "copy_source",
            BuildStep::Exec(_) => "exec",
            BuildStep::Entrypoint(_) => "entrypoint",
            BuildStep::ExposePort(_) => "expose_port",
        }
    }

    /// Dockerfile instruction for this step.
    pub fn to_instruction(&self) -> String {
        match self {
            BuildStep::From(image) => format!("FROM {}", image),
            BuildStep::Workdir(dir) => format!("WORKDIR {}", dir),
            BuildStep::CopySource { dest } => format!("COPY . {}", dest),
            BuildStep::Exec(args) => format!("RUN {}", exec_form(args)),
            BuildStep::Entrypoint(args) => format!("ENTRYPOINT {}", exec_form(args)),
            BuildStep::ExposePort(port) => format!("EXPOSE {}", port),
        }
    }
}

/// JSON array form, so arguments are never re-split by a shell.
fn exec_form(args: &[String]) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| "[]".to_string())
}

/// Ordered list of build steps. Steps apply strictly in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    steps: Vec<BuildStep>,
}

impl BuildPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dependency-installed application image described by `config`.
    pub fn application(config: &BuildConfig) -> Self {
        let mut install_runtime =
            vec!["apk".to_string(), "add".to_string(), "--no-cache".to_string()];
        install_runtime.extend(config.runtime_packages.iter().cloned());

        Self::new()
            .step(BuildStep::From(config.base_image.clone()))
            .step(BuildStep::Workdir(config.workdir.clone()))
            .step(BuildStep::CopySource {
                dest: config.workdir.clone(),
            })
            .step(BuildStep::Exec(install_runtime))
            .step(BuildStep::Exec(vec![
                "python3".to_string(),
                "-m".to_string(),
                "venv".to_string(),
                config.venv_path.clone(),
            ]))
            .step(BuildStep::Exec(vec![
                config.venv_pip(),
                "install".to_string(),
                "-r".to_string(),
                config.manifest.clone(),
            ]))
    }

    /// Append a step.
    pub fn step(mut self, step: BuildStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Copy of this plan with `step` appended; `self` is left as is.
    pub fn extended(&self, step: BuildStep) -> Self {
        self.clone().step(step)
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Render the plan as a Dockerfile.
    pub fn to_dockerfile(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            out.push_str(&step.to_instruction());
            out.push('\n');
        }
        out
    }
}
