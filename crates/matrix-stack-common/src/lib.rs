//! Common types for matrix-stack manifest verification: the typed manifest
//! model, YAML loading, and errors.

#![deny(missing_docs)]

pub mod error;
pub mod manifest;
pub mod yaml;

pub use error::Error;
pub use manifest::{
    ConfigMap, Container, Manifest, PodTemplateSpec, Secret, ServiceMonitor, Volume,
    VolumeMount, VolumeSource, Workload, WorkloadKind,
};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label carrying the chart-level component name (no release prefix)
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Label carrying `{release}-{name}`
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";

/// Label carrying the component role
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";

/// Label naming the tool that manages the resource
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label naming the umbrella application
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";

/// Label carrying the application version
pub const LABEL_VERSION: &str = "app.kubernetes.io/version";

/// Label carrying `{chart}-{chartVersion}`
pub const LABEL_HELM_CHART: &str = "helm.sh/chart";

/// Pod label carrying the sha1 of the Postgres password source
pub const LABEL_POSTGRES_PASSWORD_HASH: &str = "k8s.element.io/postgresPasswordHash";

/// Workload label that opts a workload out of ServiceMonitor coverage
pub const LABEL_SERVICE_MONITOR: &str = "servicemonitor";

/// Pod annotation that opts a workload out of ServiceMonitor coverage
pub const ANNOTATION_NO_SERVICE_MONITOR: &str = "has-no-service-monitor";

/// Helm hook annotation
pub const ANNOTATION_HELM_HOOK: &str = "helm.sh/hook";

/// Helm hook ordering annotation
pub const ANNOTATION_HELM_HOOK_WEIGHT: &str = "helm.sh/hook-weight";
