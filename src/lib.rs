//! wi-deploy - GKE Workload Identity provisioning and deployment pipeline
//!
//! wi-deploy publishes a container image, provisions the cloud and cluster
//! identities needed for Workload Identity federation, binds them together,
//! and rolls out the workload - all as one strictly sequential pipeline of
//! idempotent stages. The workload ends up reading a GCS bucket with no key
//! material anywhere in the cluster.
//!
//! # Pipeline
//!
//! 1. Build and push the container image
//! 2. Fetch cluster credentials
//! 3. Ensure the target namespace exists
//! 4. Ensure the Google service account exists and can access the bucket
//! 5. Bind the Kubernetes service account to the Google service account
//! 6. Render the deployment manifest
//! 7. Apply the manifest and wait for rollout convergence
//! 8. Probe the running workload for its effective identity (advisory)
//!
//! Every creation step tolerates pre-existing resources, so an interrupted
//! run is recovered by re-running the pipeline in full. There is no rollback.
//!
//! # Modules
//!
//! - [`config`] - Immutable deployment configuration shared by every stage
//! - [`runner`] - External command execution seam (`docker`/`gcloud`/`kubectl`)
//! - [`image`] - Image build and push
//! - [`cluster`] - Cluster credentials and namespace
//! - [`identity`] - Google service account and bucket IAM grant
//! - [`binding`] - Workload Identity trust binding and annotation
//! - [`manifest`] - Placeholder substitution and manifest metadata
//! - [`deploy`] - Manifest apply and rollout convergence
//! - [`verify`] - Post-deploy identity probe (advisory)
//! - [`pipeline`] - Stage ordering and fail-fast orchestration
//! - [`error`] - Error taxonomy

#![deny(missing_docs)]

pub mod binding;
pub mod cluster;
pub mod config;
pub mod deploy;
pub mod error;
pub mod identity;
pub mod image;
pub mod manifest;
pub mod pipeline;
pub mod runner;
pub mod verify;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// Centralizing them here keeps CLI defaults and test fixtures consistent.

/// Default container registry host
pub const DEFAULT_REGISTRY: &str = "gcr.io";

/// IAM role granted on the bucket to the Google service account
pub const BUCKET_ROLE: &str = "roles/storage.objectAdmin";

/// IAM role that lets a Kubernetes service account impersonate a Google one
pub const WORKLOAD_IDENTITY_ROLE: &str = "roles/iam.workloadIdentityUser";

/// Annotation key linking a Kubernetes service account to its Google identity
pub const GSA_ANNOTATION_KEY: &str = "iam.gke.io/gcp-service-account";

/// Default rollout convergence timeout in seconds
pub const DEFAULT_ROLLOUT_TIMEOUT_SECS: u64 = 300;

/// Default settle delay before the verification probe, in seconds
pub const DEFAULT_VERIFY_SETTLE_SECS: u64 = 10;
