//! Cluster credentials and namespace
//!
//! Second and third pipeline stages. Fetching credentials writes the cluster
//! entry into the local kubeconfig, which every later `kubectl` call relies
//! on. The namespace ensure is apply-semantics: an `AlreadyExists` response
//! from create is success, not an error.

use tracing::info;

use crate::config::DeployConfig;
use crate::error::{is_already_exists, is_permission_denied};
use crate::runner::{command_line, CommandRunner};
use crate::{Error, Result};

/// Resolve and cache cluster credentials for subsequent control-plane calls
pub async fn fetch_credentials<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
) -> Result<()> {
    let args = [
        "container",
        "clusters",
        "get-credentials",
        config.cluster.as_str(),
        "--location",
        config.location.as_str(),
        "--project",
        config.project.as_str(),
    ];
    let output = runner.run("gcloud", &args).await?;
    if !output.success {
        return Err(Error::auth(
            format!("cluster {}/{}", config.location, config.cluster),
            output.stderr,
        ));
    }

    info!(cluster = %config.cluster, "cluster credentials cached");
    Ok(())
}

/// Idempotently ensure the target namespace exists
pub async fn ensure_namespace<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
) -> Result<()> {
    let args = ["create", "namespace", config.namespace.as_str()];
    let output = runner.run("kubectl", &args).await?;

    if output.success {
        println!("  Namespace {} created", config.namespace);
        return Ok(());
    }
    if is_already_exists(&output.stderr) {
        println!("  Namespace {} already exists", config.namespace);
        return Ok(());
    }
    if is_permission_denied(&output.stderr) {
        return Err(Error::permission(
            format!("namespace/{}", config.namespace),
            output.stderr,
        ));
    }
    Err(Error::conflict(
        format!("namespace/{}", config.namespace),
        format!("{}: {}", command_line("kubectl", &args), output.stderr),
    ))
}
