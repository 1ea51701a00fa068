//! Post-deploy identity verification
//!
//! Final pipeline stage. Picks one running pod of the freshly rolled-out
//! workload and asks the metadata server, from inside the pod, which service
//! account the workload is actually using. If Workload Identity is wired up
//! correctly the answer is the Google service account email; if the pod fell
//! back to the node's default identity, the operator sees that immediately.
//!
//! This is a diagnostic read, not a gate: a mismatch is reported loudly but
//! does not fail the run or roll anything back. Probe infrastructure
//! failures (no pod, exec error) are fatal like any other stage failure.

use std::time::Instant;

use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::config::DeployConfig;
use crate::runner::{command_line, CommandRunner};
use crate::{Error, Result};

/// Metadata-server URL answering with the active service account email
const METADATA_EMAIL_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/email";

/// Outcome of the identity probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    /// The identity the binding should produce (GSA email)
    pub expected: String,
    /// The identity the workload reported
    pub observed: String,
    /// Whether observed equals expected
    pub matches: bool,
}

impl VerificationReport {
    fn new(expected: String, observed: String) -> Self {
        let matches = expected == observed;
        Self {
            expected,
            observed,
            matches,
        }
    }
}

/// Wait (bounded) for a Running pod matching the app label, return its name
pub async fn wait_for_running_pod<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
    app_label: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<String> {
    let selector = format!("app={}", app_label);
    let args = [
        "get",
        "pods",
        "-n",
        config.namespace.as_str(),
        "-l",
        selector.as_str(),
        "--field-selector=status.phase=Running",
        "-o",
        "jsonpath={.items[0].metadata.name}",
    ];

    let start = Instant::now();
    loop {
        let output = runner.run("kubectl", &args).await?;
        if output.success {
            let pod = output.stdout.trim();
            if !pod.is_empty() {
                return Ok(pod.to_string());
            }
        }

        if start.elapsed() >= timeout {
            return Err(Error::command(
                command_line("kubectl", &args),
                format!(
                    "no running pod with label {} appeared within {:?}",
                    selector, timeout
                ),
            ));
        }
        sleep(poll_interval).await;
    }
}

/// Probe the workload's effective identity and report it
///
/// Sleeps the configured settle delay first - the metadata proxy inside a
/// brand-new pod needs a moment before the probe answers meaningfully.
pub async fn verify_identity<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
    app_label: &str,
    pod_wait: Duration,
    poll_interval: Duration,
) -> Result<VerificationReport> {
    if !config.verify_settle.is_zero() {
        println!("  Waiting {:?} before probing...", config.verify_settle);
        sleep(config.verify_settle).await;
    }

    let pod = wait_for_running_pod(runner, config, app_label, pod_wait, poll_interval).await?;
    println!("  Probing pod {}...", pod);

    let args = [
        "exec",
        pod.as_str(),
        "-n",
        config.namespace.as_str(),
        "--",
        "curl",
        "-s",
        "-H",
        "Metadata-Flavor: Google",
        METADATA_EMAIL_URL,
    ];
    let output = runner.run("kubectl", &args).await?;
    if !output.success {
        return Err(Error::command(
            command_line("kubectl", &args),
            output.stderr,
        ));
    }

    let report = VerificationReport::new(config.gsa_email(), output.stdout.trim().to_string());
    if report.matches {
        info!(identity = %report.observed, "workload identity verified");
        println!("  Workload identity confirmed: {}", report.observed);
    } else {
        warn!(
            expected = %report.expected,
            observed = %report.observed,
            "workload is NOT using the intended identity"
        );
        println!(
            "  WARNING: expected identity {} but workload reports {}",
            report.expected, report.observed
        );
        println!("  The deployment stays up; inspect the binding manually.");
    }

    Ok(report)
}

/// Look up the Service's external address, if one has been assigned yet
pub async fn service_endpoint<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
    service: &str,
) -> Result<Option<String>> {
    let args = [
        "get",
        "service",
        service,
        "-n",
        config.namespace.as_str(),
        "-o",
        "jsonpath={.status.loadBalancer.ingress[0].ip}",
    ];
    let output = runner.run("kubectl", &args).await?;

    if !output.success {
        // Absent or not-yet-provisioned service is not a failure; the
        // endpoint report is informational.
        return Ok(None);
    }
    let ip = output.stdout.trim();
    if ip.is_empty() {
        Ok(None)
    } else {
        Ok(Some(ip.to_string()))
    }
}
