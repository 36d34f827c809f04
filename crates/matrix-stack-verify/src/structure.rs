//! Structural checks over a render
//!
//! Each function inspects one convention the chart follows (labels, ports,
//! Ingress shape, ServiceAccounts, ...) and returns every violation it finds.
//! Checks that depend on what a deployable declares take the topology and
//! the ownership of the render.

use std::collections::{BTreeMap, BTreeSet};

use matrix_stack_common::{
    Manifest, Result, VolumeSource, WorkloadKind, LABEL_COMPONENT, LABEL_HELM_CHART,
    LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_NAME, LABEL_PART_OF, LABEL_POSTGRES_PASSWORD_HASH,
    LABEL_VERSION,
};
use matrix_stack_topology::{DeployableDetails, Ownership, Topology};

use crate::violation::{CheckName, Violation, ViolationKind};

/// Labels every rendered resource carries
pub const STANDARD_LABELS: [&str; 7] = [
    LABEL_HELM_CHART,
    LABEL_MANAGED_BY,
    LABEL_PART_OF,
    LABEL_NAME,
    LABEL_COMPONENT,
    LABEL_INSTANCE,
    LABEL_VERSION,
];

const CHART_PREFIX: &str = "matrix-stack-";
const MANAGED_BY: &str = "Helm";
const PART_OF: &str = "matrix-stack";
const PATH_TYPE_PREFIX: &str = "Prefix";
const SECRET_TYPE_OPAQUE: &str = "Opaque";
const HEADLESS: &str = "None";

/// Pod user and group ids must be above this
const MIN_POD_ID: i64 = 1000;

/// Workload label naming the ServiceAccount shared by Synapse processes
const LABEL_SYNAPSE_INSTANCE: &str = "k8s.element.io/synapse-instance";

/// Deployables that rendered something, with what they declare
fn seen_deployables<'t>(
    topology: &'t Topology,
    ownership: &Ownership,
) -> Result<Vec<&'t DeployableDetails>> {
    ownership
        .seen()
        .into_iter()
        .map(|id| topology.get(id.as_str()))
        .collect()
}

/// A deployable declaring an Ingress renders one, and only those do
pub fn ingress_coverage(
    manifests: &[Manifest],
    topology: &Topology,
    ownership: &Ownership,
) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();
    for details in seen_deployables(topology, ownership)? {
        let ingresses: Vec<&Manifest> = ownership
            .owned_by(manifests, &details.id)
            .filter(|m| matches!(m, Manifest::Ingress(_)))
            .collect();
        match (details.has_ingress, ingresses.is_empty()) {
            (true, true) => violations.push(Violation::new(
                CheckName::IngressCoverage,
                ViolationKind::MissingResource,
                details.name(),
                "declares an Ingress but renders none",
            )),
            (false, false) => violations.extend(ingresses.into_iter().map(|m| {
                Violation::new(
                    CheckName::IngressCoverage,
                    ViolationKind::UnexpectedResource,
                    m.id(),
                    format!("{} is declared without an Ingress", details.name()),
                )
            })),
            _ => {}
        }
    }
    Ok(violations)
}

/// Every Ingress has rules, every rule a host, every path `pathType: Prefix`
pub fn ingress_rules(manifests: &[Manifest]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for manifest in manifests {
        let Manifest::Ingress(ingress) = manifest else {
            continue;
        };
        let violation = |message: String| {
            Violation::new(CheckName::IngressRules, ViolationKind::InvalidField, manifest.id(), message)
        };

        let rules = ingress
            .spec
            .as_ref()
            .and_then(|s| s.rules.as_deref())
            .unwrap_or_default();
        if rules.is_empty() {
            violations.push(violation("has no rules".to_string()));
        }
        for (index, rule) in rules.iter().enumerate() {
            if rule.host.as_deref().unwrap_or_default().is_empty() {
                violations.push(violation(format!("rule {index} has no host")));
            }
            let Some(http) = &rule.http else {
                violations.push(violation(format!("rule {index} has no http paths")));
                continue;
            };
            for path in &http.paths {
                if path.path_type != PATH_TYPE_PREFIX {
                    violations.push(
                        violation(format!(
                            "path has pathType {}, expected {PATH_TYPE_PREFIX}",
                            path.path_type
                        ))
                        .at_path(path.path.clone().unwrap_or_default()),
                    );
                }
            }
        }
    }
    violations
}

/// Every Ingress path routes to a rendered Service, on a port that Service
/// exposes by name or number
pub fn ingress_backends(manifests: &[Manifest]) -> Vec<Violation> {
    let services: BTreeMap<&str, _> = manifests
        .iter()
        .filter_map(|m| match m {
            Manifest::Service(s) => Some((m.name(), s)),
            _ => None,
        })
        .collect();

    let mut violations = Vec::new();
    for manifest in manifests {
        let Manifest::Ingress(ingress) = manifest else {
            continue;
        };
        let rules = ingress
            .spec
            .as_ref()
            .and_then(|s| s.rules.as_deref())
            .unwrap_or_default();
        let paths = rules.iter().filter_map(|r| r.http.as_ref()).flat_map(|h| &h.paths);

        for path in paths {
            let route = path.path.as_deref().unwrap_or("/");
            let violation = |kind: ViolationKind, message: String| {
                Violation::new(CheckName::IngressBackends, kind, manifest.id(), message)
            };
            let Some(backend) = path.backend.service.as_ref() else {
                violations.push(
                    violation(ViolationKind::InvalidField, format!("path {route} has no Service backend"))
                        .at_path(route),
                );
                continue;
            };
            let target = format!("Service/{}", backend.name);
            let Some(service) = services.get(backend.name.as_str()) else {
                violations.push(
                    violation(
                        ViolationKind::DanglingObjectReference,
                        format!("path {route} routes to {target}, which is not rendered"),
                    )
                    .at_path(target),
                );
                continue;
            };

            let ports = service
                .spec
                .as_ref()
                .and_then(|s| s.ports.as_deref())
                .unwrap_or_default();
            let port = backend.port.as_ref();
            let (wanted, exposed) = match port.and_then(|p| p.name.as_deref()).filter(|n| !n.is_empty()) {
                Some(name) => (
                    format!("port {name}"),
                    ports.iter().any(|p| p.name.as_deref() == Some(name)),
                ),
                None => match port.and_then(|p| p.number) {
                    Some(number) => (format!("port {number}"), ports.iter().any(|p| p.port == number)),
                    None => ("a port".to_string(), false),
                },
            };
            if !exposed {
                violations.push(
                    violation(
                        ViolationKind::DanglingObjectReference,
                        format!("path {route} routes to {wanted} of {target}, which it does not expose"),
                    )
                    .at_path(target),
                );
            }
        }
    }
    violations
}

/// A deployable declared without workloads renders none
pub fn workload_flags(
    manifests: &[Manifest],
    topology: &Topology,
    ownership: &Ownership,
) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();
    for details in seen_deployables(topology, ownership)? {
        if details.has_workloads {
            continue;
        }
        violations.extend(
            ownership
                .owned_by(manifests, &details.id)
                .filter(|m| m.as_workload().is_some())
                .map(|m| {
                    Violation::new(
                        CheckName::WorkloadFlags,
                        ViolationKind::UnexpectedResource,
                        m.id(),
                        format!("{} is declared without workloads", details.name()),
                    )
                }),
        );
    }
    Ok(violations)
}

/// The standard labels are present, non-empty and consistent with the
/// release
pub fn standard_labels(manifests: &[Manifest], release_name: &str) -> Vec<Violation> {
    let mut violations = Vec::new();
    for manifest in manifests {
        let id = manifest.id();
        let invalid = |label: &str, message: String| {
            Violation::new(CheckName::StandardLabels, ViolationKind::InvalidLabel, &id, message)
                .at_path(label)
        };

        for label in STANDARD_LABELS {
            if manifest.label(label).map_or(true, str::is_empty) {
                violations.push(invalid(label, format!("{label} label is missing or empty")));
            }
        }

        if let Some(chart) = manifest.label(LABEL_HELM_CHART) {
            if !chart.starts_with(CHART_PREFIX) {
                violations.push(invalid(
                    LABEL_HELM_CHART,
                    format!("{LABEL_HELM_CHART} is {chart}, expected a {CHART_PREFIX}* chart"),
                ));
            }
        }
        for (label, expected) in [(LABEL_MANAGED_BY, MANAGED_BY), (LABEL_PART_OF, PART_OF)] {
            match manifest.label(label) {
                Some(value) if value != expected => violations.push(invalid(
                    label,
                    format!("{label} is {value}, expected {expected}"),
                )),
                _ => {}
            }
        }
        if let (Some(instance), Some(name)) = (manifest.label(LABEL_INSTANCE), manifest.label(LABEL_NAME)) {
            let expected = format!("{release_name}-{name}");
            if instance != expected {
                violations.push(invalid(
                    LABEL_INSTANCE,
                    format!("{LABEL_INSTANCE} is {instance}, expected {expected}"),
                ));
            }
        }
    }
    violations
}

/// Every resource name starts with `{release}-{deployable}` for one of the
/// deployables that rendered something
pub fn resource_names(
    manifests: &[Manifest],
    topology: &Topology,
    ownership: &Ownership,
    release_name: &str,
) -> Result<Vec<Violation>> {
    let prefixes: Vec<String> = seen_deployables(topology, ownership)?
        .into_iter()
        .map(|details| format!("{release_name}-{}", details.name()))
        .collect();

    Ok(manifests
        .iter()
        .filter(|m| !prefixes.iter().any(|prefix| m.name().starts_with(prefix.as_str())))
        .map(|m| {
            Violation::new(
                CheckName::ResourceNames,
                ViolationKind::InvalidField,
                m.id(),
                format!("name does not start with one of [{}]", prefixes.join(",")),
            )
        })
        .collect())
}

/// Container ports in a pod are named and unique by number and name
pub fn container_ports(manifests: &[Manifest]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for manifest in manifests {
        let Some(workload) = manifest.as_workload() else {
            continue;
        };
        let mut numbers = BTreeSet::new();
        let mut names = BTreeSet::new();
        for container in &workload.pod().containers {
            for port in &container.ports {
                let invalid = |message: String| {
                    Violation::new(CheckName::ContainerPorts, ViolationKind::InvalidPort, manifest.id(), message)
                        .in_container(&container.name)
                };
                if !numbers.insert(port.container_port) {
                    violations.push(invalid(format!("port {} is not unique", port.container_port)));
                }
                match port.name.as_deref() {
                    None | Some("") => {
                        violations.push(invalid(format!("port {} has no name", port.container_port)))
                    }
                    Some(name) if !names.insert(name.to_string()) => {
                        violations.push(invalid(format!("port name {name} is not unique")))
                    }
                    Some(_) => {}
                }
            }
        }
    }
    violations
}

/// Services list ports, all named, names unique
pub fn service_ports(manifests: &[Manifest]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for manifest in manifests {
        let Manifest::Service(service) = manifest else {
            continue;
        };
        let invalid = |message: String| {
            Violation::new(CheckName::ServicePorts, ViolationKind::InvalidPort, manifest.id(), message)
        };
        let ports = service
            .spec
            .as_ref()
            .and_then(|s| s.ports.as_deref())
            .unwrap_or_default();
        if ports.is_empty() {
            violations.push(invalid("does not list any ports".to_string()));
        }
        let mut names = BTreeSet::new();
        for port in ports {
            match port.name.as_deref() {
                None | Some("") => violations.push(invalid(format!("port {} has no name", port.port))),
                Some(name) if !names.insert(name) => {
                    violations.push(invalid(format!("port name {name} is not unique")))
                }
                Some(_) => {}
            }
        }
    }
    violations
}

/// Every StatefulSet names a rendered headless Service
pub fn statefulset_services(manifests: &[Manifest]) -> Vec<Violation> {
    let services: BTreeMap<&str, _> = manifests
        .iter()
        .filter_map(|m| match m {
            Manifest::Service(s) => Some((m.name(), s)),
            _ => None,
        })
        .collect();

    let mut violations = Vec::new();
    for manifest in manifests {
        let Some(workload) = manifest
            .as_workload()
            .filter(|w| w.kind == WorkloadKind::StatefulSet)
        else {
            continue;
        };
        let violation = |kind: ViolationKind, message: String| {
            Violation::new(CheckName::StatefulSetServices, kind, manifest.id(), message)
        };
        let Some(service_name) = workload.service_name.as_deref() else {
            violations.push(violation(ViolationKind::InvalidField, "does not set serviceName".to_string()));
            continue;
        };
        match services.get(service_name) {
            None => violations.push(
                violation(
                    ViolationKind::DanglingObjectReference,
                    format!("Service/{service_name} is not rendered"),
                )
                .at_path(format!("Service/{service_name}")),
            ),
            Some(service) => {
                let cluster_ip = service.spec.as_ref().and_then(|s| s.cluster_ip.as_deref());
                if cluster_ip != Some(HEADLESS) {
                    violations.push(
                        violation(
                            ViolationKind::InvalidField,
                            format!("Service/{service_name} is not headless"),
                        )
                        .at_path(format!("Service/{service_name}")),
                    );
                }
            }
        }
    }
    violations
}

/// Rendered Secrets are `Opaque`
pub fn secret_types(manifests: &[Manifest]) -> Vec<Violation> {
    manifests
        .iter()
        .filter_map(|m| match m {
            Manifest::Secret(secret) if secret.type_.as_deref() != Some(SECRET_TYPE_OPAQUE) => {
                Some(Violation::new(
                    CheckName::SecretTypes,
                    ViolationKind::InvalidField,
                    m.id(),
                    match &secret.type_ {
                        Some(other) => format!("has type {other}, expected {SECRET_TYPE_OPAQUE}"),
                        None => "does not set a type".to_string(),
                    },
                ))
            }
            _ => None,
        })
        .collect()
}

/// Workloads run as their own rendered ServiceAccount without automounting
/// its token, and every rendered ServiceAccount is used
pub fn service_accounts(manifests: &[Manifest]) -> Vec<Violation> {
    let rendered: BTreeSet<&str> = manifests
        .iter()
        .filter(|m| matches!(m, Manifest::ServiceAccount(_)))
        .map(Manifest::name)
        .collect();
    let mut used = BTreeSet::new();
    let mut violations = Vec::new();

    for manifest in manifests {
        let Some(workload) = manifest.as_workload() else {
            continue;
        };
        let violation = |kind: ViolationKind, message: String| {
            Violation::new(CheckName::ServiceAccounts, kind, manifest.id(), message)
        };

        if workload.kind != WorkloadKind::Job && workload.pod().automount_service_account_token != Some(false) {
            violations.push(violation(
                ViolationKind::InvalidField,
                "automounts its ServiceAccount token".to_string(),
            ));
        }

        let Some(account) = workload.pod().service_account_name.as_deref() else {
            violations.push(violation(
                ViolationKind::InvalidField,
                "does not set an explicit ServiceAccount".to_string(),
            ));
            continue;
        };
        used.insert(account);
        if !rendered.contains(account) {
            violations.push(
                violation(
                    ViolationKind::DanglingObjectReference,
                    format!("ServiceAccount {account} is not rendered"),
                )
                .at_path(format!("ServiceAccount/{account}")),
            );
        }

        let expected = manifest
            .label(LABEL_SYNAPSE_INSTANCE)
            .unwrap_or_else(|| manifest.name());
        if account != expected {
            violations.push(violation(
                ViolationKind::InvalidField,
                format!("uses ServiceAccount {account}, expected {expected}"),
            ));
        }
    }

    violations.extend(rendered.difference(&used).map(|unused| {
        Violation::new(
            CheckName::ServiceAccounts,
            ViolationKind::UnusedObject,
            format!("ServiceAccount/{unused}"),
            "no workload uses this ServiceAccount",
        )
    }));
    violations
}

/// Pods set runAsUser, runAsGroup and fsGroup to one non-system id and
/// refuse to run as root
pub fn pod_security_context(manifests: &[Manifest]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for manifest in manifests {
        let Some(workload) = manifest.as_workload() else {
            continue;
        };
        let invalid = |message: String| {
            Violation::new(CheckName::PodSecurityContext, ViolationKind::InvalidField, manifest.id(), message)
        };
        let Some(context) = workload.pod().security_context.as_ref() else {
            violations.push(invalid("pod has no securityContext".to_string()));
            continue;
        };

        let ids = [
            ("runAsUser", context.run_as_user),
            ("runAsGroup", context.run_as_group),
            ("fsGroup", context.fs_group),
        ];
        for (field, id) in ids {
            match id {
                None => violations.push(invalid(format!("pod securityContext has no {field}")).at_path(field)),
                Some(id) if id <= MIN_POD_ID => violations.push(
                    invalid(format!("pod securityContext {field} {id} is not above {MIN_POD_ID}")).at_path(field),
                ),
                Some(_) => {}
            }
        }
        if context.run_as_non_root != Some(true) {
            violations.push(
                invalid("pod securityContext does not set runAsNonRoot: true".to_string()).at_path("runAsNonRoot"),
            );
        }
        if let [Some(user), Some(group), Some(fs_group)] = ids.map(|(_, id)| id) {
            if user != group || group != fs_group {
                violations.push(invalid(format!(
                    "pod securityContext ids differ: runAsUser {user}, runAsGroup {group}, fsGroup {fs_group}"
                )));
            }
        }
    }
    violations
}

/// Volume mounts resolve to pod volumes, and Secret/ConfigMap volumes to
/// rendered or external objects
pub fn volumes_exist(manifests: &[Manifest], external_secrets: &[Manifest]) -> Vec<Violation> {
    let config_maps: BTreeSet<&str> = manifests
        .iter()
        .filter(|m| matches!(m, Manifest::ConfigMap(_)))
        .map(Manifest::name)
        .collect();
    let secrets: BTreeSet<&str> = manifests
        .iter()
        .chain(external_secrets)
        .filter(|m| matches!(m, Manifest::Secret(_)))
        .map(Manifest::name)
        .collect();

    let mut violations = Vec::new();
    for manifest in manifests {
        let Some(workload) = manifest.as_workload() else {
            continue;
        };
        let dangling = |target: String| {
            Violation::new(
                CheckName::VolumesExist,
                ViolationKind::DanglingObjectReference,
                manifest.id(),
                format!("{target} is not rendered"),
            )
            .at_path(target)
        };

        for volume in &workload.pod().volumes {
            match volume.source() {
                VolumeSource::Secret(name) if !secrets.contains(name) => {
                    violations.push(dangling(format!("Secret/{name}")))
                }
                VolumeSource::ConfigMap(name) if !config_maps.contains(name) => {
                    violations.push(dangling(format!("ConfigMap/{name}")))
                }
                _ => {}
            }
        }
        for container in workload.pod().all_containers() {
            for mount in &container.volume_mounts {
                if workload.pod().volume(&mount.name).is_none() {
                    violations.push(
                        Violation::new(
                            CheckName::VolumesExist,
                            ViolationKind::DanglingObjectReference,
                            manifest.id(),
                            format!("mount of {} has no pod volume named {}", mount.mount_path, mount.name),
                        )
                        .in_container(&container.name)
                        .at_path(&mount.mount_path),
                    );
                }
            }
        }
    }
    violations
}

/// Workloads of deployables with a database carry the Postgres password
/// hash pod label
pub fn postgres_hash_label(
    manifests: &[Manifest],
    topology: &Topology,
    ownership: &Ownership,
) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();
    for (index, owner) in ownership.iter() {
        let Some(manifest) = manifests.get(index) else {
            continue;
        };
        let Some(workload) = manifest.as_workload() else {
            continue;
        };
        if !topology.get(owner.as_str())?.has_db {
            continue;
        }
        let present = workload
            .pod_labels()
            .get(LABEL_POSTGRES_PASSWORD_HASH)
            .is_some_and(|v| !v.is_empty());
        if !present {
            violations.push(
                Violation::new(
                    CheckName::PostgresHashLabel,
                    ViolationKind::InvalidLabel,
                    manifest.id(),
                    format!("{owner} uses Postgres but the pod has no {LABEL_POSTGRES_PASSWORD_HASH} label"),
                )
                .at_path(LABEL_POSTGRES_PASSWORD_HASH),
            );
        }
    }
    Ok(violations)
}
