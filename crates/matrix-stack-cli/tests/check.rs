//! `check` against rendered files on disk

use std::fs;
use std::path::Path;

use clap::Parser;
use matrix_stack_cli::commands::check::{self, CheckArgs};
use matrix_stack_cli::config::{load_config, VerifyConfig};
use matrix_stack_cli::{Cli, Commands, Error};
use matrix_stack_verify::{CheckName, ViolationKind};

const SYNAPSE: &str = include_str!("../../matrix-stack-verify/tests/fixtures/synapse.yaml");

fn check_args(manifests: &Path, extra: &[&str]) -> CheckArgs {
    let manifests = manifests.to_str().unwrap();
    let argv = ["matrix-stack-verify", "check", "-m", manifests, "--values-file", "ci/synapse-minimal-values.yaml"];
    match Cli::try_parse_from(argv.iter().chain(extra)).unwrap().command {
        Commands::Check(args) => args,
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn clean_render_passes() {
    let dir = tempfile::tempdir().unwrap();
    let render = dir.path().join("render.yaml");
    fs::write(&render, SYNAPSE).unwrap();

    let args = check_args(&render, &[]);
    let report = check::verify(&args, &VerifyConfig::default()).unwrap();
    assert!(report.is_clean(), "{report}");
    check::run(args, &VerifyConfig::default()).unwrap();
}

/// Story: an unused key fails the run, the config file can silence the
/// check, and a command-line flag can too
#[test]
fn story_unused_key_and_disabled_checks() {
    let dir = tempfile::tempdir().unwrap();
    let render = dir.path().join("render.yaml");
    fs::write(
        &render,
        SYNAPSE.replace("    signing_key_path: /secrets/pytest-synapse/SIGNING_KEY\n", ""),
    )
    .unwrap();

    let report = check::verify(&check_args(&render, &[]), &VerifyConfig::default()).unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report.for_check(CheckName::Mounts)[0].kind, ViolationKind::UnusedMount);

    let err = check::run(check_args(&render, &["--format", "json"]), &VerifyConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{err}");

    let config_path = dir.path().join("matrix-stack-verify.yaml");
    fs::write(&config_path, "disabledChecks: [mounts]\n").unwrap();
    let config = load_config(Some(config_path)).unwrap();
    assert!(check::verify(&check_args(&render, &[]), &config).unwrap().is_clean());

    let args = check_args(&render, &["--disable", "mounts"]);
    assert!(check::verify(&args, &VerifyConfig::default()).unwrap().is_clean());
}

#[test]
fn noqa_paths_from_config_exempt_keys() {
    let dir = tempfile::tempdir().unwrap();
    let render = dir.path().join("render.yaml");
    fs::write(
        &render,
        SYNAPSE.replace("    signing_key_path: /secrets/pytest-synapse/SIGNING_KEY\n", ""),
    )
    .unwrap();

    let config_path = dir.path().join("verify.yaml");
    fs::write(&config_path, "noqaPaths:\n  synapse:\n    - /secrets/pytest-synapse/SIGNING_KEY\n").unwrap();
    let config = load_config(Some(config_path)).unwrap();

    let report = check::verify(&check_args(&render, &[]), &config).unwrap();
    assert!(report.is_clean(), "{report}");
}

#[test]
fn release_name_flag_overrides_config() {
    let dir = tempfile::tempdir().unwrap();
    let render = dir.path().join("render.yaml");
    fs::write(&render, SYNAPSE.replace("pytest-", "ess-")).unwrap();

    let config = VerifyConfig {
        release_name: Some("pytest".to_string()),
        ..Default::default()
    };
    let mismatched = check::verify(&check_args(&render, &[]), &config).unwrap();
    assert!(!mismatched.for_check(CheckName::StandardLabels).is_empty());

    let report = check::verify(&check_args(&render, &["--release-name", "ess"]), &config).unwrap();
    assert!(report.is_clean(), "{report}");
}

#[test]
fn unowned_manifest_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let render = dir.path().join("render.yaml");
    fs::write(
        &render,
        SYNAPSE.replacen("app.kubernetes.io/name: synapse\n", "app.kubernetes.io/name: sliding-sync\n", 1),
    )
    .unwrap();

    let err = check::verify(&check_args(&render, &[]), &VerifyConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Verify(_)), "{err}");
}
