//! Error types for matrix-stack manifest verification
//!
//! Every variant here is a fatal infrastructure error: the topology table,
//! the naming convention, or the rendered input is inconsistent with what the
//! verifiers expect. Chart defects are not errors; they are reported as
//! violations by the verifiers. Nothing here is ever retried.

use thiserror::Error;

/// Default subject when no specific manifest or deployable is known
pub const UNKNOWN_SUBJECT: &str = "unknown";

/// Main error type for manifest verification
#[derive(Debug, Error)]
pub enum Error {
    /// YAML/JSON decoding failed
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// A rendered document does not have the shape its kind requires
    #[error("malformed manifest {manifest}: {message}")]
    Manifest {
        /// `Kind/name` of the offending document
        manifest: String,
        /// Description of what's missing or invalid
        message: String,
    },

    /// The static topology table is inconsistent
    #[error("topology error for {deployable}: {message}")]
    Topology {
        /// Deployable the problem was found on
        deployable: String,
        /// Description of the inconsistency
        message: String,
    },

    /// A manifest could not be assigned to exactly one deployable
    #[error("ownership error for {manifest}: {message}")]
    Ownership {
        /// `Kind/name` of the manifest being classified
        manifest: String,
        /// Description of why classification failed
        message: String,
    },

    /// A workload's mounts reference something that cannot be resolved
    #[error("mount error in {workload}: {message}")]
    Mount {
        /// `Kind/name` of the workload
        workload: String,
        /// Description of the unresolvable reference
        message: String,
    },
}

impl Error {
    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a malformed-manifest error
    pub fn manifest(manifest: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Manifest {
            manifest: manifest.into(),
            message: msg.into(),
        }
    }

    /// Create a topology error for a specific deployable
    pub fn topology_for(deployable: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Topology {
            deployable: deployable.into(),
            message: msg.into(),
        }
    }

    /// Create an ownership error for a manifest
    pub fn ownership(manifest: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Ownership {
            manifest: manifest.into(),
            message: msg.into(),
        }
    }

    /// Create a mount resolution error for a workload
    pub fn mount(workload: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Mount {
            workload: workload.into(),
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: a typo in the topology table is reported against the deployable
    /// that carries it, so the table can be fixed in one place.
    #[test]
    fn story_topology_errors_name_the_deployable() {
        let err = Error::topology_for("synapse", "unknown shared component 'postgress'");
        assert!(err.to_string().contains("topology error for synapse"));
        assert!(err.to_string().contains("postgress"));
    }

    /// Story: a manifest claimed by two deployables surfaces both claimants
    #[test]
    fn story_ownership_errors_name_the_manifest() {
        let err = Error::ownership(
            "Deployment/pytest-synapse-redis",
            "claimed by both synapse and synapse-redis",
        );
        assert!(err.to_string().contains("Deployment/pytest-synapse-redis"));
        assert!(err.to_string().contains("synapse-redis"));
        match &err {
            Error::Ownership { manifest, .. } => {
                assert_eq!(manifest, "Deployment/pytest-synapse-redis")
            }
            _ => panic!("Expected Ownership variant"),
        }
    }

    /// Story: a dangling mount is a chart bug surfaced with the workload name
    #[test]
    fn story_mount_errors_name_the_workload() {
        let err = Error::mount("StatefulSet/pytest-synapse-main", "no volume named 'media'");
        assert!(err.to_string().contains("mount error in StatefulSet/pytest-synapse-main"));
    }

    #[test]
    fn test_manifest_error_display() {
        let err = Error::manifest("Deployment/web", "missing spec.template");
        assert_eq!(
            err.to_string(),
            "malformed manifest Deployment/web: missing spec.template"
        );
    }
}
