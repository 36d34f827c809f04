//! ServiceMonitor coverage
//!
//! Each ServiceMonitor reaches workloads through the Services its selector
//! matches. Every workload that hasn't opted out must be reached by exactly
//! one ServiceMonitor, and nothing that opted out may be reached at all.

use std::collections::{BTreeMap, BTreeSet};

use matrix_stack_common::{
    Manifest, Result, ServiceMonitor, Workload, ANNOTATION_NO_SERVICE_MONITOR,
    LABEL_SERVICE_MONITOR,
};
use matrix_stack_topology::{Ownership, Topology};
use tracing::debug;

use crate::violation::{CheckName, Violation, ViolationKind};

/// Value of the `servicemonitor` workload label that opts out
const OPT_OUT: &str = "none";

/// Verifies ServiceMonitor coverage of a render
pub struct ServiceMonitorVerifier<'a> {
    manifests: &'a [Manifest],
}

impl<'a> ServiceMonitorVerifier<'a> {
    /// Verify `manifests`
    pub fn new(manifests: &'a [Manifest]) -> Self {
        Self { manifests }
    }

    /// Workloads that should be covered: those not opted out through the
    /// pod annotation or the workload label
    pub fn monitorable(&self) -> BTreeSet<String> {
        self.workloads()
            .filter(|(_, w)| !opted_out(w))
            .map(|(id, _)| id)
            .collect()
    }

    /// Workloads reached by one ServiceMonitor, with any orphan or
    /// overlapping-Service violations found on the way
    pub fn covered_by(
        &self,
        monitor_id: &str,
        monitor: &ServiceMonitor,
    ) -> (Vec<String>, Vec<Violation>) {
        let services: Vec<&Manifest> = self
            .manifests
            .iter()
            .filter(|m| {
                matches!(m, Manifest::Service(s)
                    if selector_matches(s.metadata.labels.as_ref(), &monitor.spec.selector.match_labels))
            })
            .collect();

        if services.is_empty() {
            return (
                vec![],
                vec![Violation::new(
                    CheckName::ServiceMonitors,
                    ViolationKind::OrphanServiceMonitor,
                    monitor_id,
                    "no Services match the selector",
                )],
            );
        }

        let mut reached = Vec::new();
        for service in &services {
            let Manifest::Service(service) = service else {
                continue;
            };
            let selector = service
                .spec
                .as_ref()
                .and_then(|s| s.selector.as_ref())
                .filter(|s| !s.is_empty());
            let Some(selector) = selector else {
                continue;
            };
            reached.extend(
                self.workloads()
                    .filter(|(_, w)| selector_matches(w.template.metadata.labels.as_ref(), selector))
                    .map(|(id, _)| id),
            );
        }

        if reached.is_empty() {
            return (
                vec![],
                vec![Violation::new(
                    CheckName::ServiceMonitors,
                    ViolationKind::EmptyServiceMonitor,
                    monitor_id,
                    format!(
                        "no workloads behind Services [{}]",
                        services.iter().map(|s| s.name()).collect::<Vec<_>>().join(",")
                    ),
                )],
            );
        }

        let mut violations = Vec::new();
        let mut unique = Vec::new();
        let mut repeated = BTreeSet::new();
        for workload in reached {
            if !unique.contains(&workload) {
                unique.push(workload);
            } else if repeated.insert(workload.clone()) {
                violations.push(
                    Violation::new(
                        CheckName::ServiceMonitors,
                        ViolationKind::RepeatedCoverage,
                        monitor_id,
                        format!("covers {workload} through more than one Service"),
                    )
                    .at_path(workload),
                );
            }
        }
        (unique, violations)
    }

    /// Run the check
    pub fn verify(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        let mut monitored_by: BTreeMap<String, String> = BTreeMap::new();

        for manifest in self.manifests {
            let Manifest::ServiceMonitor(monitor) = manifest else {
                continue;
            };
            let monitor_id = manifest.id();
            let (covered, found) = self.covered_by(&monitor_id, monitor);
            violations.extend(found);

            for workload in covered {
                match monitored_by.get(&workload) {
                    Some(previous) => violations.push(
                        Violation::new(
                            CheckName::ServiceMonitors,
                            ViolationKind::DoubleMonitored,
                            &workload,
                            format!("covered by both {previous} and {monitor_id}"),
                        )
                        .at_path(&monitor_id),
                    ),
                    None => {
                        monitored_by.insert(workload, monitor_id.clone());
                    }
                }
            }
        }

        let monitorable = self.monitorable();
        for workload in monitorable.iter().filter(|w| !monitored_by.contains_key(*w)) {
            violations.push(Violation::new(
                CheckName::ServiceMonitors,
                ViolationKind::Unmonitored,
                workload,
                "no ServiceMonitor covers this workload",
            ));
        }
        for (workload, monitor) in monitored_by.iter().filter(|(w, _)| !monitorable.contains(*w)) {
            violations.push(
                Violation::new(
                    CheckName::ServiceMonitors,
                    ViolationKind::OverMonitored,
                    workload,
                    format!("opted out of monitoring but covered by {monitor}"),
                )
                .at_path(monitor),
            );
        }

        debug!(
            monitorable = monitorable.len(),
            covered = monitored_by.len(),
            violations = violations.len(),
            "ServiceMonitor coverage verified"
        );
        violations
    }

    fn workloads(&self) -> impl Iterator<Item = (String, &'a Workload)> + '_ {
        self.manifests
            .iter()
            .filter_map(|m| m.as_workload().map(|w| (m.id(), w)))
    }
}

/// ServiceMonitors rendered by deployables declared without one
pub fn verify_declared(
    manifests: &[Manifest],
    topology: &Topology,
    ownership: &Ownership,
) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();
    for (index, owner) in ownership.iter() {
        let Some(manifest @ Manifest::ServiceMonitor(_)) = manifests.get(index) else {
            continue;
        };
        if !topology.get(owner.as_str())?.has_service_monitor {
            violations.push(Violation::new(
                CheckName::ServiceMonitorFlags,
                ViolationKind::UnexpectedResource,
                manifest.id(),
                format!("{owner} is declared without a ServiceMonitor but renders one"),
            ));
        }
    }
    Ok(violations)
}

fn opted_out(workload: &Workload) -> bool {
    let annotated = workload
        .template
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(ANNOTATION_NO_SERVICE_MONITOR));
    let labelled = workload
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(LABEL_SERVICE_MONITOR))
        .is_some_and(|v| v == OPT_OUT);
    annotated || labelled
}

/// Every selector entry is present with the same value
fn selector_matches(
    labels: Option<&BTreeMap<String, String>>,
    selector: &BTreeMap<String, String>,
) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.and_then(|l| l.get(key)) == Some(value))
}
