//! Pipeline orchestration
//!
//! The stages are an explicit ordered list, executed strictly one after the
//! other: a later stage may assume every earlier stage's side effects exist
//! (a policy binding requires the identity it binds to). The orchestrator
//! stops at the first failure and reports which stage failed; there is no
//! per-stage retry and no rollback - re-running the whole pipeline is the
//! recovery mechanism, which is safe because every creation step is
//! check-then-create or apply-semantics.

use std::time::Instant;

use tokio::time::Duration;
use tracing::error;

use crate::config::DeployConfig;
use crate::runner::{tool_available, CommandRunner, ShellRunner};
use crate::verify::VerificationReport;
use crate::{binding, cluster, deploy, identity, image, manifest, verify};
use crate::{Error, Result};

/// Interval between rollout status polls
const ROLLOUT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How long the verifier waits for a running pod to appear
const POD_WAIT: Duration = Duration::from_secs(60);

/// Interval between pod lookups while waiting
const POD_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// What a completed pipeline run produced
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The pushed image reference
    pub image_ref: String,
    /// Result of the advisory identity probe
    pub verification: VerificationReport,
    /// External address of the Service, if one was assigned
    pub endpoint: Option<String>,
}

/// The deployment pipeline
pub struct Pipeline<R: CommandRunner = ShellRunner> {
    config: DeployConfig,
    runner: R,
}

impl Pipeline<ShellRunner> {
    /// Create a pipeline that executes real commands
    pub fn new(config: DeployConfig) -> Self {
        Self {
            config,
            runner: ShellRunner,
        }
    }
}

impl<R: CommandRunner> Pipeline<R> {
    /// Create a pipeline with a custom command runner
    pub fn with_runner(config: DeployConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// The configuration this pipeline runs with
    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Check that all required tools are installed
    pub async fn check_prerequisites(&self) -> Result<()> {
        let tools = [
            ("docker", "Install Docker: https://docs.docker.com/get-docker/"),
            ("gcloud", "Install the Google Cloud CLI: https://cloud.google.com/sdk/docs/install"),
            ("kubectl", "Install kubectl: https://kubernetes.io/docs/tasks/tools/"),
        ];

        for (tool, hint) in tools {
            print!("  Checking {}... ", tool);
            if tool_available(&self.runner, tool).await? {
                println!("OK");
            } else {
                println!("NOT FOUND");
                return Err(Error::PrerequisiteNotFound {
                    tool: tool.to_string(),
                    hint: hint.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Run the full pipeline
    pub async fn run(&self) -> Result<PipelineOutcome> {
        let start = Instant::now();
        let config = &self.config;
        let runner = &self.runner;

        println!("=== wi-deploy ===");
        println!("Project:            {}", config.project);
        println!("Cluster:            {} ({})", config.cluster, config.location);
        println!("Namespace:          {}", config.namespace);
        println!("Bucket:             {}", config.bucket_url());
        println!("Identity pool:      {}", config.workload_identity_pool());
        println!();

        println!("=== Checking prerequisites ===");
        self.check_prerequisites().await?;

        println!("\n[1/8] Publishing container image...");
        let image_ref = stage("image", image::publish_image(runner, config).await)?;

        println!("\n[2/8] Fetching cluster credentials...");
        stage("cluster-auth", cluster::fetch_credentials(runner, config).await)?;

        println!("\n[3/8] Ensuring namespace {}...", config.namespace);
        stage("namespace", cluster::ensure_namespace(runner, config).await)?;

        println!("\n[4/8] Provisioning cloud identity...");
        let gsa_email = stage("identity", identity::ensure_identity(runner, config).await)?;
        stage(
            "identity",
            identity::grant_bucket_access(runner, config, &gsa_email).await,
        )?;

        println!("\n[5/8] Binding workload identity...");
        stage(
            "binding",
            binding::ensure_cluster_identity(runner, config).await,
        )?;
        stage("binding", binding::bind_trust(runner, config, &gsa_email).await)?;
        stage("binding", binding::annotate(runner, config, &gsa_email).await)?;

        println!("\n[6/8] Rendering manifest...");
        let rendered = stage("manifest", manifest::render_file(config, &image_ref).await)?;
        let info = stage("manifest", manifest::manifest_info(&rendered))?;
        println!(
            "  Deployment {} ({} replicas)",
            info.deployment, info.replicas
        );

        println!("\n[7/8] Deploying...");
        stage("deploy", deploy::apply_manifest(runner, config, &rendered).await)?;
        stage(
            "deploy",
            deploy::wait_for_rollout(runner, config, &info, ROLLOUT_POLL_INTERVAL).await,
        )?;

        println!("\n[8/8] Verifying workload identity...");
        let verification = stage(
            "verify",
            verify::verify_identity(runner, config, &info.app_label, POD_WAIT, POD_POLL_INTERVAL)
                .await,
        )?;

        let endpoint = match &info.service {
            Some(service) => {
                stage("verify", verify::service_endpoint(runner, config, service).await)?
            }
            None => None,
        };

        println!("\n=== Deployment complete ===");
        println!("Duration: {:?}", start.elapsed());
        println!("Image:    {}", image_ref);
        match &endpoint {
            Some(ip) => println!("Endpoint: http://{}/", ip),
            None => println!("Endpoint: not yet assigned (check the Service later)"),
        }

        Ok(PipelineOutcome {
            image_ref,
            verification,
            endpoint,
        })
    }
}

/// Attribute a stage failure before propagating it
fn stage<T>(name: &str, result: Result<T>) -> Result<T> {
    result.map_err(|e| {
        error!(stage = name, error = %e, "stage failed");
        eprintln!("\nstage '{}' failed: {}", name, e);
        e
    })
}
