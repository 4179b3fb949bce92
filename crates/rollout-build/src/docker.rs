//! Docker CLI engine.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::engine::ContainerEngine;
use crate::error::BuildError;
use crate::image::{ImageRef, LocalImage, ServiceHandle};
use crate::plan::BuildPlan;
use crate::Result;

/// Result of one engine command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Step the command belongs to.
    pub step: String,

    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stdout line, trimmed.
    pub fn last_line(&self) -> Option<&str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty()).last()
    }
}

/// Engine driving the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    program: String,
    timeout_secs: u64,
}

impl Default for DockerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerEngine {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
            timeout_secs: 1800,
        }
    }

    /// Use a different CLI executable (e.g. `podman`).
    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Run one CLI command, optionally feeding `stdin`.
    pub async fn execute(
        &self,
        step: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<CommandOutput> {
        let start = Instant::now();
        debug!(step = %step, program = %self.program, ?args, "Running engine command");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BuildError::Spawn {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // A command may exit without reading its input; its exit code decides.
            match pipe.write_all(input).await {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
                _ => {}
            }
            drop(pipe);
        }

        let output = if self.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| BuildError::Timeout {
                step: step.to_string(),
                timeout_secs: self.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        Ok(CommandOutput {
            step: step.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Like `execute`, but a non-zero exit is an error.
    async fn execute_ok(
        &self,
        step: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<CommandOutput> {
        let output = self.execute(step, args, stdin).await?;
        if !output.passed() {
            return Err(BuildError::CommandFailed {
                step: step.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn produced(step: &str, output: &CommandOutput) -> Result<String> {
        output
            .last_line()
            .map(str::to_string)
            .ok_or_else(|| BuildError::CommandFailed {
                step: step.to_string(),
                exit_code: output.exit_code,
                stderr: "command produced no output".to_string(),
            })
    }
}

/// Repository part of an image reference: tag and digest stripped.
fn repository(reference: &str) -> &str {
    let without_digest = reference.split('@').next().unwrap_or(reference);
    match without_digest.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => repo,
        _ => without_digest,
    }
}

/// The entry of a `{{json .RepoDigests}}` listing that belongs to the
/// repository `registry` was pushed to.
fn repo_digest_for(listing: &str, registry: &str) -> Option<String> {
    let digests: Vec<String> = serde_json::from_str(listing).ok()?;
    let target = repository(registry);
    digests
        .into_iter()
        .find(|entry| entry.contains('@') && repository(entry) == target)
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    fn name(&self) -> &str {
        &self.program
    }

    async fn build(&self, plan: &BuildPlan, context: &Path) -> Result<LocalImage> {
        let dockerfile = plan.to_dockerfile();
        let mut build_args = args(&["build", "--quiet", "--file", "-"]);
        build_args.push(context.to_string_lossy().to_string());

        let output = self
            .execute_ok("build", &build_args, Some(dockerfile.as_bytes()))
            .await?;
        let id = Self::produced("build", &output)?;
        info!(image_id = %id, steps = plan.len(), duration_ms = output.duration_ms, "Image built");

        Ok(LocalImage {
            id,
            steps: plan.len(),
        })
    }

    async fn publish(&self, image: &LocalImage, registry: &str) -> Result<ImageRef> {
        self.execute_ok("tag", &args(&["tag", &image.id, registry]), None)
            .await?;
        self.execute_ok("push", &args(&["push", registry]), None)
            .await?;

        let inspect = self
            .execute(
                "inspect",
                &args(&[
                    "image",
                    "inspect",
                    "--format",
                    "{{json .RepoDigests}}",
                    registry,
                ]),
                None,
            )
            .await?;

        let digest_ref = if inspect.passed() {
            inspect
                .last_line()
                .and_then(|line| repo_digest_for(line, registry))
        } else {
            None
        };
        let image_ref = ImageRef::parse(digest_ref.as_deref().unwrap_or(registry))?;
        if image_ref.digest().is_none() {
            warn!(registry = %registry, "No digest recorded for this repository, using tag");
        }
        info!(image = %image_ref, "Image published");
        Ok(image_ref)
    }

    async fn serve(&self, image: &LocalImage, port: u16, cmd: &[String]) -> Result<ServiceHandle> {
        let mut run_args = args(&["run", "--detach", "--rm", "--publish"]);
        run_args.push(format!("{}:{}", port, port));
        run_args.push(image.id.clone());
        run_args.extend(cmd.iter().cloned());

        let output = self.execute_ok("run", &run_args, None).await?;
        let container_id = Self::produced("run", &output)?;
        info!(container_id = %container_id, port = port, "Service started");

        Ok(ServiceHandle {
            container_id,
            image_id: image.id.clone(),
            port,
        })
    }

    async fn stop(&self, handle: &ServiceHandle) -> Result<()> {
        self.execute_ok("stop", &args(&["stop", &handle.container_id]), None)
            .await?;
        info!(container_id = %handle.container_id, "Service stopped");
        Ok(())
    }
}
