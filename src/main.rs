//! wi-deploy - GKE Workload Identity provisioning and deployment CLI

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wi_deploy::config::DeployConfig;
use wi_deploy::pipeline::Pipeline;
use wi_deploy::{DEFAULT_REGISTRY, DEFAULT_ROLLOUT_TIMEOUT_SECS, DEFAULT_VERIFY_SETTLE_SECS};

/// wi-deploy - provision Workload Identity and deploy a GCS-backed workload
#[derive(Parser, Debug)]
#[command(name = "wi-deploy", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full provisioning and deployment pipeline
    ///
    /// Builds and pushes the image, provisions the Google service account
    /// and its bucket grant, binds the Kubernetes service account to it,
    /// deploys the workload, and verifies the effective identity. Safe to
    /// re-run: every creation step tolerates pre-existing resources.
    Deploy(DeployArgs),
}

/// Deploy mode arguments
#[derive(Parser, Debug)]
struct DeployArgs {
    /// GCP project identifier
    #[arg(long, env = "WI_DEPLOY_PROJECT")]
    project: String,

    /// GKE cluster name
    #[arg(long)]
    cluster: String,

    /// GKE cluster location (zone or region)
    #[arg(long)]
    location: String,

    /// Target Kubernetes namespace
    #[arg(long, default_value = "default")]
    namespace: String,

    /// GCS bucket the workload will access (without gs:// prefix)
    #[arg(long)]
    bucket: String,

    /// Image name
    #[arg(long)]
    image: String,

    /// Image tag
    #[arg(long, default_value = "latest")]
    tag: String,

    /// Container registry host
    #[arg(long, default_value = DEFAULT_REGISTRY)]
    registry: String,

    /// Google service account short name
    #[arg(long)]
    gsa: String,

    /// Kubernetes service account name
    #[arg(long)]
    ksa: String,

    /// Docker build context directory
    #[arg(long, default_value = ".")]
    context: PathBuf,

    /// Path to the deployment manifest template
    #[arg(long, default_value = "deploy/deployment.yaml")]
    manifest: PathBuf,

    /// Rollout convergence timeout in seconds
    #[arg(long, default_value_t = DEFAULT_ROLLOUT_TIMEOUT_SECS)]
    rollout_timeout_secs: u64,

    /// Settle delay before the verification probe, in seconds
    #[arg(long, default_value_t = DEFAULT_VERIFY_SETTLE_SECS)]
    verify_settle_secs: u64,
}

impl From<DeployArgs> for DeployConfig {
    fn from(args: DeployArgs) -> Self {
        DeployConfig {
            project: args.project,
            cluster: args.cluster,
            location: args.location,
            namespace: args.namespace,
            bucket: args.bucket,
            registry: args.registry,
            image: args.image,
            tag: args.tag,
            gsa: args.gsa,
            ksa: args.ksa,
            context_dir: args.context,
            manifest_path: args.manifest,
            rollout_timeout: Duration::from_secs(args.rollout_timeout_secs),
            verify_settle: Duration::from_secs(args.verify_settle_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy(args) => {
            let pipeline = Pipeline::new(args.into());
            pipeline.run().await.map_err(|e| anyhow::anyhow!("{}", e))?;
            Ok(())
        }
    }
}
