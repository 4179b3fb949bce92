//! rollout - build, publish and deploy a containerized application
//!
//! ## Commands
//!
//! - `build`: build the dependency-installed image
//! - `push`: build with entrypoint and publish to the registry
//! - `run`: build and run locally on port 80 until Ctrl-C
//! - `deploy`: push, register a new task definition revision and point the
//!   service at it

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use rollout_build::{BuildConfig, BuildPipeline, DockerEngine, ImageRef};
use rollout_core::{DeployRequest, Deployer};
use rollout_ecs::{CredentialProvider, EcsConnector, EnvCredentials, SecretRefCredentials};

#[derive(Parser, Debug)]
#[command(name = "rollout")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build a container image and roll it out to ECS", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    /// Base image for builds
    #[arg(long, global = true, env = "ROLLOUT_BASE_IMAGE")]
    base_image: Option<String>,

    /// Registry target for pushes
    #[arg(long, global = true, env = "ROLLOUT_REGISTRY")]
    registry: Option<String>,

    /// Per-command timeout for the container engine, in seconds
    #[arg(long, global = true, env = "ROLLOUT_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the application image
    Build {
        /// Source directory (default: current directory)
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Build and publish the application image
    Push {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Build and run the application locally until Ctrl-C
    Run {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Publish the image and swap an ECS service onto a new revision
    Deploy {
        /// Cluster containing the service
        #[arg(long)]
        cluster: String,

        /// Service to update
        #[arg(long)]
        service: String,

        /// Task definition family to revise
        #[arg(long)]
        task_definition_family: String,

        /// AWS region
        #[arg(long, env = "AWS_REGION")]
        region: String,

        /// Access key id: a literal, `env:NAME` or `file:PATH`
        #[arg(long, requires = "secret_key")]
        access_key: Option<String>,

        /// Secret access key: a literal, `env:NAME` or `file:PATH`
        #[arg(long, requires = "access_key")]
        secret_key: Option<String>,

        /// Session token: a literal, `env:NAME` or `file:PATH`
        #[arg(long, requires = "access_key")]
        session_token: Option<String>,

        /// Deploy this already-published image instead of building one
        #[arg(long)]
        image: Option<String>,

        /// Source directory (default: current directory)
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

impl Cli {
    /// Environment defaults with command-line overrides applied.
    fn build_config(&self) -> BuildConfig {
        let mut config = BuildConfig::from_env();
        if let Some(image) = &self.base_image {
            config = config.with_base_image(image);
        }
        if let Some(registry) = &self.registry {
            config = config.with_registry(registry);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout_secs(secs);
        }
        config
    }

    fn build_pipeline(&self) -> BuildPipeline<DockerEngine> {
        let config = self.build_config();
        let engine = DockerEngine::new().with_timeout_secs(config.timeout_secs);
        BuildPipeline::new(engine, config)
    }
}

#[derive(Serialize)]
struct BuildOutput<'a> {
    image_id: &'a str,
    steps: usize,
}

#[derive(Serialize)]
struct PushOutput<'a> {
    image: &'a ImageRef,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    rollout_core::init_tracing(cli.json, level);

    match &cli.command {
        Commands::Build { dir } => cmd_build(&cli, dir).await,
        Commands::Push { dir } => cmd_push(&cli, dir).await,
        Commands::Run { dir } => cmd_run(&cli, dir).await,
        Commands::Deploy {
            cluster,
            service,
            task_definition_family,
            region,
            access_key,
            secret_key,
            session_token,
            image,
            dir,
        } => {
            let mut request =
                DeployRequest::new(cluster, service, task_definition_family, region)
                    .with_source(dir);
            if let Some(image) = image {
                request = request.with_image(
                    ImageRef::parse(image.as_str()).context("Invalid --image reference")?,
                );
            }

            match (access_key, secret_key) {
                (Some(ak), Some(sk)) => {
                    let credentials =
                        SecretRefCredentials::parse(ak, sk, session_token.as_deref());
                    cmd_deploy(&cli, credentials, request).await
                }
                _ => cmd_deploy(&cli, EnvCredentials::new(), request).await,
            }
        }
    }
}

async fn cmd_build(cli: &Cli, dir: &Path) -> Result<()> {
    let image = cli
        .build_pipeline()
        .build(dir)
        .await
        .with_context(|| format!("Failed to build image from {}", dir.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&BuildOutput {
                image_id: &image.id,
                steps: image.steps,
            })?
        );
    } else {
        println!("{}", image.id);
    }
    Ok(())
}

async fn cmd_push(cli: &Cli, dir: &Path) -> Result<()> {
    let pipeline = cli.build_pipeline();
    let image = pipeline
        .push(dir)
        .await
        .with_context(|| format!("Failed to push image to {}", pipeline.config().registry))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&PushOutput { image: &image })?);
    } else {
        println!("{}", image);
    }
    Ok(())
}

async fn cmd_run(cli: &Cli, dir: &Path) -> Result<()> {
    let pipeline = cli.build_pipeline();
    let handle = pipeline
        .run(dir)
        .await
        .with_context(|| format!("Failed to run image from {}", dir.display()))?;

    println!("Serving on {} (Ctrl-C to stop)", handle.endpoint());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!(container_id = %handle.container_id, "Stopping service");
    pipeline
        .stop(&handle)
        .await
        .context("Failed to stop service container")?;
    Ok(())
}

async fn cmd_deploy<K: CredentialProvider>(
    cli: &Cli,
    credentials: K,
    request: DeployRequest,
) -> Result<()> {
    let target = format!("{}/{}", request.cluster, request.service);
    let deployer = Deployer::new(cli.build_pipeline(), credentials, EcsConnector::new());

    let outcome = deployer
        .deploy(request)
        .await
        .with_context(|| format!("Deploy to {} failed", target))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome);
    }
    Ok(())
}
