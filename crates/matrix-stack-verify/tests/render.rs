//! End-to-end verification of a reduced Synapse render

use matrix_stack_common::manifest::parse_manifests;
use matrix_stack_common::{Error, Manifest};
use matrix_stack_topology::Topology;
use matrix_stack_verify::{
    CheckName, RenderedChart, Report, Verifier, ViolationKind, DEFAULT_RELEASE_NAME,
};

const SYNAPSE: &str = include_str!("fixtures/synapse.yaml");

fn chart(yaml: &str, external: &str) -> Result<RenderedChart, Error> {
    let topology = Topology::matrix_stack()?;
    RenderedChart::classify(
        &topology,
        ["synapse"],
        parse_manifests(yaml)?,
        parse_manifests(external)?,
    )
}

fn verify(yaml: &str) -> Report {
    verify_with_external(yaml, "")
}

fn verify_with_external(yaml: &str, external: &str) -> Report {
    let topology = Topology::matrix_stack().unwrap();
    let chart = chart(yaml, external).unwrap();
    Verifier::new(&topology, DEFAULT_RELEASE_NAME).run(&chart).unwrap()
}

#[test]
fn test_fixture_is_clean() {
    let report = verify(SYNAPSE);
    assert!(report.is_clean(), "{report}");
    assert_eq!(report.checks, CheckName::ALL.to_vec());
}

#[test]
fn test_every_manifest_is_owned_by_synapse() {
    let chart = chart(SYNAPSE, "").unwrap();
    assert_eq!(chart.ownership.len(), chart.manifests.len());
    assert!(chart.ownership.iter().all(|(_, owner)| owner.as_str() == "synapse"));
}

/// Story: dropping the signing key from homeserver.yaml leaves the mounted
/// key unused, and nothing else changes
#[test]
fn story_unused_secret_key() {
    let yaml = SYNAPSE.replace("    signing_key_path: /secrets/pytest-synapse/SIGNING_KEY\n", "");
    let report = verify(&yaml);

    assert_eq!(report.len(), 1, "{report}");
    let violation = &report.for_check(CheckName::Mounts)[0];
    assert_eq!(violation.kind, ViolationKind::UnusedMount);
    assert_eq!(violation.manifest, "StatefulSet/pytest-synapse-main");
    assert_eq!(violation.container.as_deref(), Some("synapse"));
    assert_eq!(violation.path.as_deref(), Some("/secrets/pytest-synapse/SIGNING_KEY"));
}

/// Story: a typo in a config file path is both an unused key and a
/// reference to something that isn't mounted
#[test]
fn story_config_path_typo() {
    let yaml = SYNAPSE.replace("log_config: /conf/log_config.yaml", "log_config: /conf/logging.yaml");
    let report = verify(&yaml);

    let found: Vec<_> = report
        .for_check(CheckName::Mounts)
        .iter()
        .map(|v| (v.kind, v.path.as_deref()))
        .collect();
    assert_eq!(
        found,
        vec![
            (ViolationKind::UnusedMount, Some("/conf/log_config.yaml")),
            (ViolationKind::DanglingReference, Some("/conf/logging.yaml")),
        ]
    );
    let dangling = &report.for_check(CheckName::Mounts)[1];
    assert!(dangling.message.contains("ConfigMap pytest-synapse/homeserver.yaml"));
}

#[test]
fn test_missing_service_monitor() {
    let yaml = SYNAPSE.replace("kind: ServiceMonitor", "kind: PodMonitor");
    let report = verify(&yaml);

    assert_eq!(report.len(), 1, "{report}");
    let violation = &report.for_check(CheckName::ServiceMonitors)[0];
    assert_eq!(violation.kind, ViolationKind::Unmonitored);
    assert_eq!(violation.manifest, "StatefulSet/pytest-synapse-main");
}

#[test]
fn test_opted_out_workload_is_over_monitored() {
    let yaml = SYNAPSE.replace(
        "    k8s.element.io/synapse-instance: pytest-synapse\n",
        "    k8s.element.io/synapse-instance: pytest-synapse\n    servicemonitor: none\n",
    );
    let report = verify(&yaml);

    let kinds: Vec<_> = report.iter().map(|v| v.kind).collect();
    assert_eq!(kinds, vec![ViolationKind::OverMonitored]);
    assert_eq!(
        report.for_check(CheckName::ServiceMonitors)[0].path.as_deref(),
        Some("ServiceMonitor/pytest-synapse")
    );
}

#[test]
fn test_disabled_checks_are_skipped() {
    let yaml = SYNAPSE.replace("    signing_key_path: /secrets/pytest-synapse/SIGNING_KEY\n", "");
    let topology = Topology::matrix_stack().unwrap();
    let chart = chart(&yaml, "").unwrap();
    let verifier = Verifier::new(&topology, DEFAULT_RELEASE_NAME).with_disabled([CheckName::Mounts]);

    assert!(!verifier.is_enabled(CheckName::Mounts));
    let report = verifier.run(&chart).unwrap();
    assert!(report.is_clean(), "{report}");
    assert_eq!(report.checks.len(), CheckName::ALL.len() - 1);
    assert!(!report.checks.contains(&CheckName::Mounts));
}

#[test]
fn test_release_name_mismatch() {
    let topology = Topology::matrix_stack().unwrap();
    let chart = chart(SYNAPSE, "").unwrap();
    let report = Verifier::new(&topology, "ess").run(&chart).unwrap();

    let labels = report.for_check(CheckName::StandardLabels);
    assert_eq!(labels.len(), chart.manifests.len());
    assert!(labels.iter().all(|v| v.kind == ViolationKind::InvalidLabel));
}

/// Story: when the chart is told to use an existing Secret, the Secret only
/// exists outside the render and its keys are still checked
#[test]
fn story_external_secret() {
    let yaml = SYNAPSE.replace("secretName: pytest-synapse", "secretName: synapse-admin-provided");
    let external = r#"
apiVersion: v1
kind: Secret
metadata:
  name: synapse-admin-provided
type: Opaque
data:
  MACAROON: c2VjcmV0
  SIGNING_KEY: ZWQyNTUxOSBhX2tleSBzZWNyZXQ=
  UNUSED: c2VjcmV0
"#;

    let chart_without = chart(&yaml, "").unwrap();
    let topology = Topology::matrix_stack().unwrap();
    let err = Verifier::new(&topology, DEFAULT_RELEASE_NAME)
        .run(&chart_without)
        .unwrap_err();
    assert!(matches!(err, Error::Mount { .. }), "{err}");

    let report = verify_with_external(&yaml, external);
    let found: Vec<_> = report.iter().map(|v| (v.check, v.kind, v.path.as_deref())).collect();
    assert_eq!(
        found,
        vec![(
            CheckName::Mounts,
            ViolationKind::UnusedMount,
            Some("/secrets/pytest-synapse/UNUSED")
        )]
    );
}

#[test]
fn test_unowned_manifest_is_fatal() {
    let yaml = SYNAPSE.replacen("app.kubernetes.io/name: synapse\n", "app.kubernetes.io/name: sliding-sync\n", 1);
    let err = chart(&yaml, "").unwrap_err();
    assert!(matches!(err, Error::Ownership { ref manifest, .. } if manifest == "ServiceAccount/pytest-synapse"));
}

#[test]
fn test_unknown_component_is_fatal() {
    let topology = Topology::matrix_stack().unwrap();
    let err = RenderedChart::classify(&topology, ["sliding-sync"], Vec::<Manifest>::new(), vec![])
        .unwrap_err();
    assert!(matches!(err, Error::Topology { .. }));
}
