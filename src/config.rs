//! Deployment configuration
//!
//! A single immutable [`DeployConfig`] is built once from the CLI and passed
//! by reference into every stage. Derived identifiers (image reference, GSA
//! email, Workload Identity member string) are computed here so the format
//! strings live in exactly one place.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one deployment run
///
/// Immutable after construction; no stage mutates it.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// GCP project identifier
    pub project: String,
    /// GKE cluster name
    pub cluster: String,
    /// GKE cluster location (zone or region)
    pub location: String,
    /// Target Kubernetes namespace
    pub namespace: String,
    /// GCS bucket name (without the gs:// prefix)
    pub bucket: String,
    /// Container registry host
    pub registry: String,
    /// Image name (repository path under the project)
    pub image: String,
    /// Image tag
    pub tag: String,
    /// Google service account short name
    pub gsa: String,
    /// Kubernetes service account name
    pub ksa: String,
    /// Local docker build context directory
    pub context_dir: PathBuf,
    /// Path to the deployment manifest template
    pub manifest_path: PathBuf,
    /// Rollout convergence timeout
    pub rollout_timeout: Duration,
    /// Settle delay before the verification probe
    pub verify_settle: Duration,
}

impl DeployConfig {
    /// Full image reference: `{registry}/{project}/{image}:{tag}`
    pub fn image_ref(&self) -> String {
        format!(
            "{}/{}/{}:{}",
            self.registry, self.project, self.image, self.tag
        )
    }

    /// Email of the Google service account:
    /// `{gsa}@{project}.iam.gserviceaccount.com`
    pub fn gsa_email(&self) -> String {
        format!("{}@{}.iam.gserviceaccount.com", self.gsa, self.project)
    }

    /// The project's Workload Identity pool: `{project}.svc.id.goog`
    pub fn workload_identity_pool(&self) -> String {
        format!("{}.svc.id.goog", self.project)
    }

    /// IAM member string authorizing exactly this (namespace, KSA) pair:
    /// `serviceAccount:{project}.svc.id.goog[{namespace}/{ksa}]`
    pub fn workload_identity_member(&self) -> String {
        format!(
            "serviceAccount:{}[{}/{}]",
            self.workload_identity_pool(),
            self.namespace,
            self.ksa
        )
    }

    /// Bucket URL: `gs://{bucket}`
    pub fn bucket_url(&self) -> String {
        format!("gs://{}", self.bucket)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// The end-to-end scenario config used throughout the test suite
    pub fn sample_config() -> DeployConfig {
        DeployConfig {
            project: "p1".to_string(),
            cluster: "cluster-1".to_string(),
            location: "us-central1".to_string(),
            namespace: "ns1".to_string(),
            bucket: "b1".to_string(),
            registry: "gcr.io".to_string(),
            image: "demo".to_string(),
            tag: "v1".to_string(),
            gsa: "gsa1".to_string(),
            ksa: "ksa1".to_string(),
            context_dir: PathBuf::from("."),
            manifest_path: PathBuf::from("deploy/deployment.yaml"),
            rollout_timeout: Duration::from_secs(300),
            verify_settle: Duration::ZERO,
        }
    }
}
