//! Workload Identity binding
//!
//! Fifth pipeline stage. Three operations link the Kubernetes service
//! account to the Google one:
//!
//! 1. [`ensure_cluster_identity`] - create the KSA (AlreadyExists tolerated)
//! 2. [`bind_trust`] - grant `roles/iam.workloadIdentityUser` on the GSA to
//!    exactly the `[namespace/name]` member, nothing broader
//! 3. [`annotate`] - stamp the KSA with the GSA email so the token exchange
//!    knows which identity to assume; always overwritten, last write wins
//!
//! The trust binding and the annotation may run in either order, but both
//! require the KSA to exist and the GSA to be confirmed present - the
//! pipeline guarantees that by stage ordering.

use tracing::info;

use crate::config::DeployConfig;
use crate::error::{is_already_exists, is_permission_denied};
use crate::runner::{command_line, CommandRunner};
use crate::{Error, Result, GSA_ANNOTATION_KEY, WORKLOAD_IDENTITY_ROLE};

/// Idempotently ensure the Kubernetes service account exists
pub async fn ensure_cluster_identity<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
) -> Result<()> {
    let args = [
        "create",
        "serviceaccount",
        config.ksa.as_str(),
        "-n",
        config.namespace.as_str(),
    ];
    let output = runner.run("kubectl", &args).await?;

    if output.success {
        println!("  Service account {}/{} created", config.namespace, config.ksa);
        return Ok(());
    }
    if is_already_exists(&output.stderr) {
        println!(
            "  Service account {}/{} already exists",
            config.namespace, config.ksa
        );
        return Ok(());
    }
    if is_permission_denied(&output.stderr) {
        return Err(Error::permission(
            format!("serviceaccount/{}", config.ksa),
            output.stderr,
        ));
    }
    Err(Error::conflict(
        format!("serviceaccount/{}", config.ksa),
        format!("{}: {}", command_line("kubectl", &args), output.stderr),
    ))
}

/// Authorize the (namespace, KSA) pair to impersonate the Google identity
pub async fn bind_trust<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
    gsa_email: &str,
) -> Result<()> {
    let member = config.workload_identity_member();

    let args = [
        "iam",
        "service-accounts",
        "add-iam-policy-binding",
        gsa_email,
        "--project",
        config.project.as_str(),
        "--member",
        member.as_str(),
        "--role",
        WORKLOAD_IDENTITY_ROLE,
    ];
    let output = runner.run("gcloud", &args).await?;

    if !output.success {
        if is_permission_denied(&output.stderr) {
            return Err(Error::permission(gsa_email, output.stderr));
        }
        return Err(Error::command(command_line("gcloud", &args), output.stderr));
    }

    info!(member = %member, gsa = %gsa_email, "trust binding applied");
    println!("  Trusted {} to impersonate {}", member, gsa_email);
    Ok(())
}

/// Annotate the KSA with the Google identity's email (overwrite semantics)
pub async fn annotate<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
    gsa_email: &str,
) -> Result<()> {
    let annotation = format!("{}={}", GSA_ANNOTATION_KEY, gsa_email);

    let args = [
        "annotate",
        "serviceaccount",
        config.ksa.as_str(),
        "-n",
        config.namespace.as_str(),
        annotation.as_str(),
        "--overwrite",
    ];
    let output = runner.run("kubectl", &args).await?;

    if !output.success {
        if is_permission_denied(&output.stderr) {
            return Err(Error::permission(
                format!("serviceaccount/{}", config.ksa),
                output.stderr,
            ));
        }
        return Err(Error::command(
            command_line("kubectl", &args),
            output.stderr,
        ));
    }

    println!("  Annotated {}/{} with {}", config.namespace, config.ksa, gsa_email);
    Ok(())
}
