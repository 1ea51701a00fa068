//! Google service account provisioning and bucket access
//!
//! Fourth pipeline stage. The existence check is an optimization only: if a
//! concurrent run creates the account between our describe and our create,
//! the "already exists" response from create is treated as success, so two
//! racing runs converge on the same state.
//!
//! The account is never deleted by this pipeline.

use tracing::info;

use crate::config::DeployConfig;
use crate::error::{is_already_exists, is_not_found, is_permission_denied};
use crate::runner::{command_line, CommandRunner};
use crate::{Error, Result, BUCKET_ROLE};

/// Ensure the Google service account exists, returning its email address
///
/// Check-then-create: describe first, create only if absent.
pub async fn ensure_identity<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
) -> Result<String> {
    let email = config.gsa_email();

    let describe = [
        "iam",
        "service-accounts",
        "describe",
        email.as_str(),
        "--project",
        config.project.as_str(),
    ];
    let output = runner.run("gcloud", &describe).await?;

    if output.success {
        println!("  Service account {} already exists", email);
        return Ok(email);
    }
    if is_permission_denied(&output.stderr) {
        return Err(Error::permission(&email, output.stderr));
    }
    if !is_not_found(&output.stderr) {
        // Transient API error: surface it verbatim rather than guessing.
        return Err(Error::command(
            command_line("gcloud", &describe),
            output.stderr,
        ));
    }

    println!("  Creating service account {}...", email);
    let create = [
        "iam",
        "service-accounts",
        "create",
        config.gsa.as_str(),
        "--project",
        config.project.as_str(),
        "--display-name",
        config.gsa.as_str(),
    ];
    let output = runner.run("gcloud", &create).await?;

    if output.success || is_already_exists(&output.stderr) {
        info!(gsa = %email, "service account present");
        return Ok(email);
    }
    if is_permission_denied(&output.stderr) {
        return Err(Error::permission(&email, output.stderr));
    }
    Err(Error::conflict(&email, output.stderr))
}

/// Grant the service account access to the bucket
///
/// Policy-binding addition is idempotent on the API side: binding the same
/// role to the same member twice is a no-op.
pub async fn grant_bucket_access<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
    gsa_email: &str,
) -> Result<()> {
    let bucket = config.bucket_url();
    let member = format!("serviceAccount:{}", gsa_email);

    let args = [
        "storage",
        "buckets",
        "add-iam-policy-binding",
        bucket.as_str(),
        "--member",
        member.as_str(),
        "--role",
        BUCKET_ROLE,
    ];
    let output = runner.run("gcloud", &args).await?;

    if !output.success {
        if is_permission_denied(&output.stderr) {
            return Err(Error::permission(&bucket, output.stderr));
        }
        return Err(Error::command(command_line("gcloud", &args), output.stderr));
    }

    println!("  Granted {} on {} to {}", BUCKET_ROLE, bucket, gsa_email);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::sample_config;
    use crate::runner::testing::ScriptedRunner;
    use crate::runner::CommandOutput;

    const NOT_FOUND: &str =
        "ERROR: (gcloud.iam.service-accounts.describe) NOT_FOUND: Unknown service account";

    #[tokio::test]
    async fn existing_identity_is_not_recreated() {
        let runner = ScriptedRunner::new(|_, args| {
            assert_eq!(args[2], "describe", "create must not run");
            Ok(CommandOutput::ok("email: gsa1@p1.iam.gserviceaccount.com"))
        });

        let email = ensure_identity(&runner, &sample_config()).await.unwrap();
        assert_eq!(email, "gsa1@p1.iam.gserviceaccount.com");
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn absent_identity_is_created() {
        let runner = ScriptedRunner::new(|_, args| match args[2].as_str() {
            "describe" => Ok(CommandOutput::err(NOT_FOUND)),
            "create" => Ok(CommandOutput::ok("Created service account [gsa1].")),
            other => panic!("unexpected subcommand {}", other),
        });

        let email = ensure_identity(&runner, &sample_config()).await.unwrap();
        assert_eq!(email, "gsa1@p1.iam.gserviceaccount.com");

        let lines = runner.call_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("service-accounts create gsa1"));
        assert!(lines[1].contains("--project p1"));
    }

    #[tokio::test]
    async fn ensure_identity_twice_converges_without_error() {
        // Run 1: absent, created. Run 2: describe finds it, no create.
        let runner = ScriptedRunner::new({
            let mut created = false;
            move |_, args| match args[2].as_str() {
                "describe" if created => Ok(CommandOutput::ok("email: ...")),
                "describe" => Ok(CommandOutput::err(NOT_FOUND)),
                "create" => {
                    created = true;
                    Ok(CommandOutput::ok("Created service account [gsa1]."))
                }
                other => panic!("unexpected subcommand {}", other),
            }
        });

        let config = sample_config();
        let first = ensure_identity(&runner, &config).await.unwrap();
        let second = ensure_identity(&runner, &config).await.unwrap();
        assert_eq!(first, second);

        // describe + create, then describe only
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn lost_create_race_is_still_success() {
        // A concurrent run created the account between describe and create.
        let runner = ScriptedRunner::new(|_, args| match args[2].as_str() {
            "describe" => Ok(CommandOutput::err(NOT_FOUND)),
            "create" => Ok(CommandOutput::err(
                "ERROR: (gcloud.iam.service-accounts.create) Resource already exists.",
            )),
            other => panic!("unexpected subcommand {}", other),
        });

        let email = ensure_identity(&runner, &sample_config()).await.unwrap();
        assert_eq!(email, "gsa1@p1.iam.gserviceaccount.com");
    }

    #[tokio::test]
    async fn permission_denied_on_create_names_the_identity() {
        let runner = ScriptedRunner::new(|_, args| match args[2].as_str() {
            "describe" => Ok(CommandOutput::err(NOT_FOUND)),
            _ => Ok(CommandOutput::err(
                "ERROR: (gcloud.iam.service-accounts.create) PERMISSION_DENIED",
            )),
        });

        let result = ensure_identity(&runner, &sample_config()).await;
        match result {
            Err(Error::PermissionDenied { resource, .. }) => {
                assert_eq!(resource, "gsa1@p1.iam.gserviceaccount.com");
            }
            other => panic!("expected PermissionDenied, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn transient_describe_error_is_surfaced_verbatim() {
        let runner = ScriptedRunner::new(|_, _| {
            Ok(CommandOutput::err("ERROR: gcloud crashed: UNAVAILABLE: 503"))
        });

        let result = ensure_identity(&runner, &sample_config()).await;
        match result {
            Err(Error::CommandFailed { message, .. }) => {
                assert!(message.contains("UNAVAILABLE"));
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn bucket_grant_uses_object_admin_role() {
        let runner = ScriptedRunner::always_ok();
        grant_bucket_access(
            &runner,
            &sample_config(),
            "gsa1@p1.iam.gserviceaccount.com",
        )
        .await
        .unwrap();

        let line = &runner.call_lines()[0];
        assert!(line.contains("add-iam-policy-binding gs://b1"));
        assert!(line.contains("--member serviceAccount:gsa1@p1.iam.gserviceaccount.com"));
        assert!(line.contains("--role roles/storage.objectAdmin"));
    }

    #[tokio::test]
    async fn bucket_grant_twice_is_harmless() {
        // The API treats a repeated binding as a no-op and exits zero.
        let runner = ScriptedRunner::always_ok();
        let config = sample_config();
        let email = config.gsa_email();

        grant_bucket_access(&runner, &config, &email).await.unwrap();
        grant_bucket_access(&runner, &config, &email).await.unwrap();

        let lines = runner.call_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], lines[1]);
    }

    #[tokio::test]
    async fn bucket_grant_permission_denied_names_the_bucket() {
        let runner = ScriptedRunner::new(|_, _| {
            Ok(CommandOutput::err(
                "ERROR: (gcloud.storage.buckets.add-iam-policy-binding) PERMISSION_DENIED",
            ))
        });

        let config = sample_config();
        let result = grant_bucket_access(&runner, &config, &config.gsa_email()).await;
        match result {
            Err(Error::PermissionDenied { resource, .. }) => {
                assert_eq!(resource, "gs://b1");
            }
            other => panic!("expected PermissionDenied, got {:?}", other),
        }
    }
}
