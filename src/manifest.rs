//! Manifest templating
//!
//! Sixth pipeline stage. The manifest template is opaque text with two
//! substitution points: the image reference and the bucket name the workload
//! reads. Substitution is global - every occurrence of a placeholder is
//! replaced, because a stale placeholder left in the applied manifest is a
//! correctness bug, not a degraded result. No schema validation happens
//! here; a malformed template is a caller error.
//!
//! [`manifest_info`] additionally parses a minimal typed view (deployment
//! name, replica count, app label, service name) out of the rendered YAML so
//! the deployer knows what to watch and the verifier knows which pods to
//! probe.

use serde::Deserialize;

use crate::config::DeployConfig;
use crate::{Error, Result};

/// Placeholder replaced by the full image reference
pub const IMAGE_PLACEHOLDER: &str = "IMAGE_PLACEHOLDER";

/// Placeholder replaced by the bucket name
pub const BUCKET_PLACEHOLDER: &str = "BUCKET_NAME_PLACEHOLDER";

/// Replace every placeholder occurrence in the template
pub fn render(template: &str, image_ref: &str, bucket: &str) -> String {
    template
        .replace(IMAGE_PLACEHOLDER, image_ref)
        .replace(BUCKET_PLACEHOLDER, bucket)
}

/// Load the manifest template from disk and render it
pub async fn render_file(config: &DeployConfig, image_ref: &str) -> Result<String> {
    let template = tokio::fs::read_to_string(&config.manifest_path)
        .await
        .map_err(|e| {
            Error::manifest(format!(
                "failed to read template {}: {}",
                config.manifest_path.display(),
                e
            ))
        })?;
    Ok(render(&template, image_ref, &config.bucket))
}

/// Minimal typed view of a rendered manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestInfo {
    /// Name of the Deployment resource
    pub deployment: String,
    /// Desired replica count (defaults to 1 when unset)
    pub replicas: i32,
    /// Pod selector `app` label, used to find pods for the probe
    pub app_label: String,
    /// Name of the Service resource, if the manifest contains one
    pub service: Option<String>,
}

/// Extract [`ManifestInfo`] from a rendered (possibly multi-document) manifest
pub fn manifest_info(rendered: &str) -> Result<ManifestInfo> {
    let mut deployment: Option<(String, i32, String)> = None;
    let mut service: Option<String> = None;

    for doc in serde_yaml::Deserializer::from_str(rendered) {
        let value = serde_yaml::Value::deserialize(doc)
            .map_err(|e| Error::manifest(format!("invalid YAML in rendered manifest: {}", e)))?;

        let kind = value.get("kind").and_then(|k| k.as_str());
        let name = value
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(|n| n.as_str());

        match (kind, name) {
            (Some("Deployment"), Some(name)) => {
                let replicas = value
                    .get("spec")
                    .and_then(|s| s.get("replicas"))
                    .and_then(|r| r.as_i64())
                    .unwrap_or(1) as i32;
                let app_label = value
                    .get("spec")
                    .and_then(|s| s.get("selector"))
                    .and_then(|s| s.get("matchLabels"))
                    .and_then(|l| l.get("app"))
                    .and_then(|a| a.as_str())
                    .unwrap_or(name)
                    .to_string();
                deployment = Some((name.to_string(), replicas, app_label));
            }
            (Some("Service"), Some(name)) => {
                service = Some(name.to_string());
            }
            _ => {}
        }
    }

    let (deployment, replicas, app_label) = deployment
        .ok_or_else(|| Error::manifest("rendered manifest contains no Deployment document"))?;

    Ok(ManifestInfo {
        deployment,
        replicas,
        app_label,
        service,
    })
}
