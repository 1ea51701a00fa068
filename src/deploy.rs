//! Manifest apply and rollout convergence
//!
//! Seventh pipeline stage. The rendered manifest is applied through kubectl
//! stdin, then the deployment status is polled until every desired replica
//! is updated, available, and ready - or the configured timeout fires.
//! Re-running with the same manifest is idempotent: re-apply, re-converge.
//!
//! On timeout the error carries the replica counts observed at that moment;
//! there is no automatic rollback.

use std::time::Instant;

use serde::Deserialize;
use tokio::time::{sleep, Duration};
use tracing::info;

use crate::config::DeployConfig;
use crate::error::is_permission_denied;
use crate::manifest::ManifestInfo;
use crate::runner::{command_line, CommandRunner};
use crate::{Error, Result};

/// Observed state of a rollout at one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutStatus {
    /// No replicas updated yet (status not populated)
    Pending,
    /// Some replicas ready, not yet converged
    Progressing {
        /// Replicas currently ready
        ready: i32,
        /// Replicas the spec asks for
        desired: i32,
    },
    /// Running replicas match the desired specification
    Ready,
}

/// Typed view of `kubectl get deployment -o json`, status fields only
#[derive(Debug, Deserialize)]
struct DeploymentView {
    #[serde(default)]
    spec: SpecView,
    #[serde(default)]
    status: StatusView,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SpecView {
    replicas: i32,
}

impl Default for SpecView {
    fn default() -> Self {
        Self { replicas: 1 }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StatusView {
    ready_replicas: i32,
    updated_replicas: i32,
    available_replicas: i32,
}

fn classify(view: &DeploymentView) -> RolloutStatus {
    let desired = view.spec.replicas;
    let status = &view.status;
    if status.ready_replicas >= desired
        && status.updated_replicas >= desired
        && status.available_replicas >= desired
    {
        RolloutStatus::Ready
    } else if status.ready_replicas == 0 && status.updated_replicas == 0 {
        RolloutStatus::Pending
    } else {
        RolloutStatus::Progressing {
            ready: status.ready_replicas,
            desired,
        }
    }
}

/// Apply the rendered manifest to the target namespace
pub async fn apply_manifest<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
    rendered: &str,
) -> Result<()> {
    let args = ["apply", "-n", config.namespace.as_str(), "-f", "-"];
    let output = runner.run_with_stdin("kubectl", &args, rendered).await?;

    if !output.success {
        if is_permission_denied(&output.stderr) {
            return Err(Error::permission(
                format!("namespace/{}", config.namespace),
                output.stderr,
            ));
        }
        return Err(Error::command(
            command_line("kubectl", &args),
            output.stderr,
        ));
    }

    println!("  Manifest applied to namespace {}", config.namespace);
    Ok(())
}

/// Block until the deployment converges, bounded by the configured timeout
pub async fn wait_for_rollout<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
    manifest: &ManifestInfo,
    poll_interval: Duration,
) -> Result<()> {
    let start = Instant::now();
    let mut last_ready = 0;
    let mut last_desired = manifest.replicas;

    loop {
        let args = [
            "get",
            "deployment",
            manifest.deployment.as_str(),
            "-n",
            config.namespace.as_str(),
            "-o",
            "json",
        ];
        let output = runner.run("kubectl", &args).await?;

        // The deployment may not be queryable for a moment right after
        // apply; treat that the same as an empty status.
        if output.success {
            let view: DeploymentView = serde_json::from_str(&output.stdout).map_err(|e| {
                Error::command(
                    command_line("kubectl", &args),
                    format!("unparseable deployment status: {}", e),
                )
            })?;

            match classify(&view) {
                RolloutStatus::Ready => {
                    info!(deployment = %manifest.deployment, "rollout converged");
                    println!(
                        "  Rollout of {} converged ({} replicas ready)",
                        manifest.deployment, view.spec.replicas
                    );
                    return Ok(());
                }
                RolloutStatus::Progressing { ready, desired } => {
                    println!("  Rollout progressing: {}/{} replicas ready", ready, desired);
                    last_ready = ready;
                    last_desired = desired;
                }
                RolloutStatus::Pending => {
                    println!("  Rollout pending...");
                    last_desired = view.spec.replicas;
                }
            }
        }

        if start.elapsed() >= config.rollout_timeout {
            return Err(Error::RolloutTimeout {
                deployment: manifest.deployment.clone(),
                ready: last_ready,
                desired: last_desired,
                timeout: config.rollout_timeout,
            });
        }

        sleep(poll_interval).await;
    }
}
