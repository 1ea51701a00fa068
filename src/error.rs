//! Error types for the deployment pipeline
//!
//! Every variant except the plumbing ones (`CommandFailed`, `Io`) maps to a
//! failure category from a specific pipeline stage. All of them are fatal:
//! the pipeline stops at the first error and reports which resource it was
//! operating on, with the underlying tool's stderr verbatim. An identity
//! mismatch during verification is deliberately not represented here - the
//! verifier reports it without failing the run.

use std::time::Duration;

use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Container image build or push failure
    #[error("image build/push failed for {image}: {message}")]
    BuildFailure {
        /// The image reference being built or pushed
        image: String,
        /// Error output from the build tool
        message: String,
    },

    /// Cluster or cloud authentication failure
    #[error("authentication failed for {target}: {message}")]
    AuthFailure {
        /// What we were authenticating against (cluster or project)
        target: String,
        /// Error output from the auth call
        message: String,
    },

    /// IAM refused to grant or apply a policy binding
    #[error("permission denied on {resource}: {message}")]
    PermissionDenied {
        /// The resource the grant was targeting
        resource: String,
        /// Error output from the IAM call
        message: String,
    },

    /// A creation failed for a reason other than the resource pre-existing
    #[error("conflict creating {resource}: {message}")]
    ResourceConflict {
        /// The resource being created
        resource: String,
        /// Error output from the creation call
        message: String,
    },

    /// Rollout did not converge within the configured timeout
    #[error(
        "rollout of {deployment} timed out after {timeout:?} ({ready}/{desired} replicas ready)"
    )]
    RolloutTimeout {
        /// The deployment that failed to converge
        deployment: String,
        /// Replicas observed ready when the timeout fired
        ready: i32,
        /// Replicas the spec asked for
        desired: i32,
        /// The configured convergence timeout
        timeout: Duration,
    },

    /// Manifest template or parse problem
    #[error("manifest error: {0}")]
    Manifest(String),

    /// An external command failed to execute or exited non-zero
    #[error("command failed: {command} - {message}")]
    CommandFailed {
        /// The command that failed
        command: String,
        /// Error output
        message: String,
    },

    /// A prerequisite tool is missing from PATH
    #[error("prerequisite not found: {tool} - {hint}")]
    PrerequisiteNotFound {
        /// The tool that was not found
        tool: String,
        /// Hint for how to install it
        hint: String,
    },

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a build failure for the given image
    pub fn build(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BuildFailure {
            image: image.into(),
            message: message.into(),
        }
    }

    /// Create an authentication failure for the given target
    pub fn auth(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthFailure {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a permission-denied error for the given resource
    pub fn permission(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a resource conflict error for the given resource
    pub fn conflict(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceConflict {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a manifest error with the given message
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Create a command failure with the given command line and message
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Whether stderr from a creation call indicates the resource already exists.
///
/// Both gcloud ("already exists", "ALREADY_EXISTS") and kubectl
/// ("AlreadyExists") report pre-existence with distinctive markers. Treating
/// these as success is what makes every creation stage apply-semantics, and
/// also closes the check-then-act race: if a concurrent run wins the create,
/// this run still converges.
pub fn is_already_exists(stderr: &str) -> bool {
    stderr.contains("already exists")
        || stderr.contains("AlreadyExists")
        || stderr.contains("ALREADY_EXISTS")
        || stderr.contains("alreadyExists")
}

/// Whether stderr indicates the caller lacks permission
pub fn is_permission_denied(stderr: &str) -> bool {
    stderr.contains("PERMISSION_DENIED")
        || stderr.contains("Permission denied")
        || stderr.contains("permission denied")
        || stderr.contains("(Forbidden)")
        || stderr.contains("403")
}

/// Whether stderr from a describe call indicates the resource does not exist
pub fn is_not_found(stderr: &str) -> bool {
    stderr.contains("NOT_FOUND")
        || stderr.contains("NotFound")
        || stderr.contains("not found")
        || stderr.contains("does not exist")
}
