//! Image build and push
//!
//! First pipeline stage. Builds the container image from the local context
//! and pushes it to the registry. Nothing in the cluster or the project has
//! been mutated yet, so any failure here aborts with no cleanup required.
//! Pushes are not retried; the pipeline is re-run in full instead.

use tracing::info;

use crate::config::DeployConfig;
use crate::error::is_permission_denied;
use crate::runner::{command_line, CommandRunner};
use crate::{Error, Result};

/// Build and push the container image, returning the pushed reference
pub async fn publish_image<R: CommandRunner + ?Sized>(
    runner: &R,
    config: &DeployConfig,
) -> Result<String> {
    let image_ref = config.image_ref();
    let context = config.context_dir.to_string_lossy().to_string();

    println!("  Building {}...", image_ref);
    let args = ["build", "-t", image_ref.as_str(), context.as_str()];
    let output = runner.run("docker", &args).await?;
    if !output.success {
        return Err(Error::build(&image_ref, output.stderr));
    }

    println!("  Pushing {}...", image_ref);
    let args = ["push", image_ref.as_str()];
    let output = runner.run("docker", &args).await?;
    if !output.success {
        // A rejected push is an auth problem with the registry, not a build
        // problem with the image.
        if is_permission_denied(&output.stderr) || output.stderr.contains("unauthorized") {
            return Err(Error::auth(&image_ref, output.stderr));
        }
        return Err(Error::command(
            command_line("docker", &args),
            output.stderr,
        ));
    }

    info!(image = %image_ref, "image pushed");
    Ok(image_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::sample_config;
    use crate::runner::testing::ScriptedRunner;
    use crate::runner::CommandOutput;

    #[tokio::test]
    async fn publishes_build_then_push() {
        let runner = ScriptedRunner::always_ok();
        let image_ref = publish_image(&runner, &sample_config()).await.unwrap();

        assert_eq!(image_ref, "gcr.io/p1/demo:v1");
        let lines = runner.call_lines();
        assert_eq!(lines[0], "docker build -t gcr.io/p1/demo:v1 .");
        assert_eq!(lines[1], "docker push gcr.io/p1/demo:v1");
    }

    #[tokio::test]
    async fn build_failure_is_fatal_and_stops_before_push() {
        let runner = ScriptedRunner::new(|_, args| {
            if args.first().map(String::as_str) == Some("build") {
                Ok(CommandOutput::err("COPY failed: no such file"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        });

        let result = publish_image(&runner, &sample_config()).await;
        match result {
            Err(Error::BuildFailure { image, message }) => {
                assert_eq!(image, "gcr.io/p1/demo:v1");
                assert!(message.contains("COPY failed"));
            }
            other => panic!("expected BuildFailure, got {:?}", other),
        }
        // Push never attempted after a failed build
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn unauthorized_push_is_an_auth_failure() {
        let runner = ScriptedRunner::new(|_, args| {
            if args.first().map(String::as_str) == Some("push") {
                Ok(CommandOutput::err("unauthorized: authentication required"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        });

        let result = publish_image(&runner, &sample_config()).await;
        assert!(matches!(result, Err(Error::AuthFailure { .. })));
    }
}
