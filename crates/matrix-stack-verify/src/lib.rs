//! Consistency verification of rendered matrix-stack manifests
//!
//! The verifiers here run over the output of `helm template` for one values
//! file. Each returns the chart defects it finds as [`Violation`]s; a
//! [`Verifier`] runs the enabled ones and collects them into a [`Report`].
//! Infrastructure problems (unknown components, unowned manifests,
//! unresolvable mounts) abort with an [`Error`] instead.

#![deny(missing_docs)]

pub mod mounts;
pub mod report;
pub mod scan;
pub mod service_monitors;
pub mod structure;
pub mod violation;

use std::collections::BTreeSet;

pub use matrix_stack_common::{Error, Result};
use matrix_stack_common::Manifest;
use matrix_stack_topology::{Classifier, Ownership, Topology};
use tracing::{debug, info};

pub use mounts::MountVerifier;
pub use report::Report;
pub use service_monitors::ServiceMonitorVerifier;
pub use violation::{CheckName, Violation, ViolationKind};

/// Release name used by the chart's CI renders
pub const DEFAULT_RELEASE_NAME: &str = "pytest";

/// One render with every manifest assigned to its owner
#[derive(Clone, Debug)]
pub struct RenderedChart {
    /// Documents produced by `helm template`
    pub manifests: Vec<Manifest>,
    /// Secrets the chart expects to exist before install
    pub external_secrets: Vec<Manifest>,
    /// Owner of each manifest
    pub ownership: Ownership,
}

impl RenderedChart {
    /// Resolve the active components and classify every manifest
    pub fn classify<I, S>(
        topology: &Topology,
        active_components: I,
        manifests: Vec<Manifest>,
        external_secrets: Vec<Manifest>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let candidates = topology.resolve(active_components)?;
        let ownership = Classifier::new(topology, candidates).classify_all(&manifests)?;
        Ok(Self {
            manifests,
            external_secrets,
            ownership,
        })
    }
}

/// Runs the enabled checks against a [`RenderedChart`]
#[derive(Clone, Debug)]
pub struct Verifier<'t> {
    topology: &'t Topology,
    release_name: String,
    disabled: BTreeSet<CheckName>,
}

impl<'t> Verifier<'t> {
    /// A verifier with every check enabled
    pub fn new(topology: &'t Topology, release_name: impl Into<String>) -> Self {
        Self {
            topology,
            release_name: release_name.into(),
            disabled: BTreeSet::new(),
        }
    }

    /// Skip the given checks
    pub fn with_disabled(mut self, checks: impl IntoIterator<Item = CheckName>) -> Self {
        self.disabled.extend(checks);
        self
    }

    /// Whether a check will run
    pub fn is_enabled(&self, check: CheckName) -> bool {
        !self.disabled.contains(&check)
    }

    /// Run every enabled check
    pub fn run(&self, chart: &RenderedChart) -> Result<Report> {
        let mut report = Report::default();
        for check in CheckName::ALL.into_iter().filter(|c| self.is_enabled(*c)) {
            let violations = self.run_check(check, chart)?;
            debug!(%check, violations = violations.len(), "check finished");
            report.record(check, violations);
        }
        info!(
            checks = report.checks.len(),
            violations = report.len(),
            manifests = chart.manifests.len(),
            "verification finished"
        );
        Ok(report)
    }

    fn run_check(&self, check: CheckName, chart: &RenderedChart) -> Result<Vec<Violation>> {
        let manifests = chart.manifests.as_slice();
        let topology = self.topology;
        let ownership = &chart.ownership;
        match check {
            CheckName::Mounts => MountVerifier::new(manifests, &chart.external_secrets)
                .with_exemptions(topology, ownership)
                .verify(),
            CheckName::ServiceMonitors => Ok(ServiceMonitorVerifier::new(manifests).verify()),
            CheckName::ServiceMonitorFlags => {
                service_monitors::verify_declared(manifests, topology, ownership)
            }
            CheckName::IngressCoverage => structure::ingress_coverage(manifests, topology, ownership),
            CheckName::IngressRules => Ok(structure::ingress_rules(manifests)),
            CheckName::IngressBackends => Ok(structure::ingress_backends(manifests)),
            CheckName::WorkloadFlags => structure::workload_flags(manifests, topology, ownership),
            CheckName::StandardLabels => {
                Ok(structure::standard_labels(manifests, &self.release_name))
            }
            CheckName::ResourceNames => {
                structure::resource_names(manifests, topology, ownership, &self.release_name)
            }
            CheckName::ContainerPorts => Ok(structure::container_ports(manifests)),
            CheckName::ServicePorts => Ok(structure::service_ports(manifests)),
            CheckName::StatefulSetServices => Ok(structure::statefulset_services(manifests)),
            CheckName::SecretTypes => Ok(structure::secret_types(manifests)),
            CheckName::ServiceAccounts => Ok(structure::service_accounts(manifests)),
            CheckName::PodSecurityContext => Ok(structure::pod_security_context(manifests)),
            CheckName::VolumesExist => {
                Ok(structure::volumes_exist(manifests, &chart.external_secrets))
            }
            CheckName::PostgresHashLabel => {
                structure::postgres_hash_label(manifests, topology, ownership)
            }
        }
    }
}
