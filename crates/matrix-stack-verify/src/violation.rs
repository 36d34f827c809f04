//! Chart defects found by the verifiers
//!
//! Violations are data, not errors: every check collects all of them so one
//! run surfaces every inconsistency in a render.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The checks a [`crate::Verifier`] can run
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum CheckName {
    /// Mounted Secret/ConfigMap keys against their references
    Mounts,
    /// ServiceMonitor coverage of workloads
    ServiceMonitors,
    /// ServiceMonitors only from deployables declaring one
    ServiceMonitorFlags,
    /// Ingresses only from deployables declaring one, and all of those
    IngressCoverage,
    /// Ingress rule shape
    IngressRules,
    /// Ingress backends name rendered Service ports
    IngressBackends,
    /// Workloads only from deployables declaring them
    WorkloadFlags,
    /// Standard Kubernetes/Helm labels
    StandardLabels,
    /// Resource names carry a rendered deployable's prefix
    ResourceNames,
    /// Container port naming and uniqueness
    ContainerPorts,
    /// Service port naming and uniqueness
    ServicePorts,
    /// StatefulSets governed by a headless Service
    StatefulSetServices,
    /// Rendered Secrets are Opaque
    SecretTypes,
    /// ServiceAccounts referenced and used
    ServiceAccounts,
    /// Pods run as a non-root user, group and fsGroup
    PodSecurityContext,
    /// Volume mounts and volume sources resolve
    VolumesExist,
    /// Postgres password hash pod label
    PostgresHashLabel,
}

impl CheckName {
    /// Every check, in the order reports list them
    pub const ALL: [CheckName; 17] = [
        CheckName::Mounts,
        CheckName::ServiceMonitors,
        CheckName::ServiceMonitorFlags,
        CheckName::IngressCoverage,
        CheckName::IngressRules,
        CheckName::IngressBackends,
        CheckName::WorkloadFlags,
        CheckName::StandardLabels,
        CheckName::ResourceNames,
        CheckName::ContainerPorts,
        CheckName::ServicePorts,
        CheckName::StatefulSetServices,
        CheckName::SecretTypes,
        CheckName::ServiceAccounts,
        CheckName::PodSecurityContext,
        CheckName::VolumesExist,
        CheckName::PostgresHashLabel,
    ];

    /// Kebab-case name used in config files and output
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckName::Mounts => "mounts",
            CheckName::ServiceMonitors => "service-monitors",
            CheckName::ServiceMonitorFlags => "service-monitor-flags",
            CheckName::IngressCoverage => "ingress-coverage",
            CheckName::IngressRules => "ingress-rules",
            CheckName::IngressBackends => "ingress-backends",
            CheckName::WorkloadFlags => "workload-flags",
            CheckName::StandardLabels => "standard-labels",
            CheckName::ResourceNames => "resource-names",
            CheckName::ContainerPorts => "container-ports",
            CheckName::ServicePorts => "service-ports",
            CheckName::StatefulSetServices => "stateful-set-services",
            CheckName::SecretTypes => "secret-types",
            CheckName::ServiceAccounts => "service-accounts",
            CheckName::PodSecurityContext => "pod-security-context",
            CheckName::VolumesExist => "volumes-exist",
            CheckName::PostgresHashLabel => "postgres-hash-label",
        }
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CheckName::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown check '{s}'"))
    }
}

/// What went wrong
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    /// A mounted key nothing references
    UnusedMount,
    /// A reference under a mount directory to a key nothing mounts
    DanglingReference,
    /// Two mounts in one container expose the same key
    DuplicateMountedKey,
    /// Two mounts in one container share a mount path
    DuplicateMountPath,
    /// A hook mounts something that isn't created strictly before it
    HookOrdering,
    /// `render-config` feeds containers that mount no inputs
    RenderConfigWithoutInputs,
    /// A ServiceMonitor selecting no Services
    OrphanServiceMonitor,
    /// A ServiceMonitor whose Services select no workloads
    EmptyServiceMonitor,
    /// A ServiceMonitor reaching a workload through several Services
    RepeatedCoverage,
    /// A workload covered by two ServiceMonitors
    DoubleMonitored,
    /// A monitorable workload no ServiceMonitor covers
    Unmonitored,
    /// A covered workload that opted out of monitoring
    OverMonitored,
    /// A resource rendered by a deployable declared not to have it
    UnexpectedResource,
    /// A resource a deployable declares but didn't render
    MissingResource,
    /// A malformed field value
    InvalidField,
    /// A label missing or with the wrong value
    InvalidLabel,
    /// A port missing a name or clashing with another
    InvalidPort,
    /// A reference to something not rendered
    DanglingObjectReference,
    /// A rendered object nothing uses
    UnusedObject,
}

impl ViolationKind {
    /// Kebab-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::UnusedMount => "unused-mount",
            ViolationKind::DanglingReference => "dangling-reference",
            ViolationKind::DuplicateMountedKey => "duplicate-mounted-key",
            ViolationKind::DuplicateMountPath => "duplicate-mount-path",
            ViolationKind::HookOrdering => "hook-ordering",
            ViolationKind::RenderConfigWithoutInputs => "render-config-without-inputs",
            ViolationKind::OrphanServiceMonitor => "orphan-service-monitor",
            ViolationKind::EmptyServiceMonitor => "empty-service-monitor",
            ViolationKind::RepeatedCoverage => "repeated-coverage",
            ViolationKind::DoubleMonitored => "double-monitored",
            ViolationKind::Unmonitored => "unmonitored",
            ViolationKind::OverMonitored => "over-monitored",
            ViolationKind::UnexpectedResource => "unexpected-resource",
            ViolationKind::MissingResource => "missing-resource",
            ViolationKind::InvalidField => "invalid-field",
            ViolationKind::InvalidLabel => "invalid-label",
            ViolationKind::InvalidPort => "invalid-port",
            ViolationKind::DanglingObjectReference => "dangling-object-reference",
            ViolationKind::UnusedObject => "unused-object",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chart defect
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Check that found it
    pub check: CheckName,
    /// Category
    pub kind: ViolationKind,
    /// `Kind/name` of the offending manifest
    pub manifest: String,
    /// Container, for pod-level findings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Key, path or reference implicated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Human-readable description
    pub message: String,
}

impl Violation {
    /// A violation against a whole manifest
    pub fn new(
        check: CheckName,
        kind: ViolationKind,
        manifest: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            check,
            kind,
            manifest: manifest.into(),
            container: None,
            path: None,
            message: message.into(),
        }
    }

    /// Narrow to a container
    pub fn in_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Attach the implicated key or path
    pub fn at_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.kind, self.manifest, self.message)?;
        if let Some(container) = &self.container {
            write!(f, " (container {container})")?;
        }
        Ok(())
    }
}
