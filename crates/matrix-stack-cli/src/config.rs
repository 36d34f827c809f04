//! Verifier configuration file
//!
//! An optional YAML file adjusting a run:
//! - `releaseName`: the Helm release the render was made with
//! - `disabledChecks`: checks to skip
//! - `noqaPaths`: extra mount paths per deployable exempt from the mount check
//!
//! The config file resolution chain (highest priority first):
//! 1. Explicit `--config` flag
//! 2. `MATRIX_STACK_VERIFY_CONFIG` environment variable
//! 3. `./matrix-stack-verify.yaml`
//! 4. Built-in defaults

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use matrix_stack_topology::Topology;
use matrix_stack_verify::{CheckName, DEFAULT_RELEASE_NAME};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

const CONFIG_FILE_NAME: &str = "matrix-stack-verify.yaml";
const CONFIG_ENV: &str = "MATRIX_STACK_VERIFY_CONFIG";

/// Settings loaded from the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct VerifyConfig {
    /// Release name the render was made with
    pub release_name: Option<String>,
    /// Checks never run
    pub disabled_checks: Vec<CheckName>,
    /// Deployable name to extra exempt mount paths
    pub noqa_paths: BTreeMap<String, Vec<String>>,
}

impl VerifyConfig {
    /// The configured release name, or the CI default
    pub fn release_name(&self) -> &str {
        self.release_name.as_deref().unwrap_or(DEFAULT_RELEASE_NAME)
    }

    /// Add the configured noqa paths to the topology
    pub fn apply_noqa_paths(&self, topology: &mut Topology) -> Result<()> {
        for (deployable, paths) in &self.noqa_paths {
            topology.add_noqa_paths(deployable, paths.iter().cloned())?;
        }
        Ok(())
    }
}

/// Resolve the config file path using the priority chain.
///
/// Returns `None` when no config file applies.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_default();
    resolve_from(explicit, std::env::var(CONFIG_ENV).ok(), &cwd)
}

fn resolve_from(explicit: Option<&Path>, env: Option<String>, dir: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }

    let local = dir.join(CONFIG_FILE_NAME);
    local.exists().then_some(local)
}

/// Load the config, returning defaults when there is no file
pub fn load_config(path: Option<PathBuf>) -> Result<VerifyConfig> {
    let Some(path) = path else {
        return Ok(VerifyConfig::default());
    };
    let data = std::fs::read_to_string(&path).map_err(|source| Error::Read {
        path: path.clone(),
        source,
    })?;
    let config: VerifyConfig = if data.trim().is_empty() {
        VerifyConfig::default()
    } else {
        serde_yaml::from_str(&data).map_err(|e| Error::config(&path, e.to_string()))?
    };
    debug!(path = %path.display(), ?config, "loaded config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn resolve_explicit_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "").unwrap();

        let result = resolve_from(
            Some(Path::new("/explicit/config.yaml")),
            Some("/from/env.yaml".to_string()),
            dir.path(),
        );
        assert_eq!(result, Some(PathBuf::from("/explicit/config.yaml")));
    }

    #[test]
    fn resolve_env_before_local_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "").unwrap();

        let result = resolve_from(None, Some("/from/env.yaml".to_string()), dir.path());
        assert_eq!(result, Some(PathBuf::from("/from/env.yaml")));
    }

    #[test]
    fn resolve_local_file_then_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolve_from(None, Some(String::new()), dir.path()), None);

        fs::write(dir.path().join(CONFIG_FILE_NAME), "").unwrap();
        assert_eq!(
            resolve_from(None, None, dir.path()),
            Some(dir.path().join(CONFIG_FILE_NAME))
        );
    }

    #[test]
    fn load_defaults_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config, VerifyConfig::default());
        assert_eq!(config.release_name(), "pytest");
    }

    #[test]
    fn load_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verify.yaml");
        fs::write(
            &path,
            r#"
releaseName: ess
disabledChecks:
  - postgres-hash-label
  - service-monitors
noqaPaths:
  synapse:
    - /usr/local/share/synapse
"#,
        )
        .unwrap();

        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.release_name(), "ess");
        assert_eq!(
            config.disabled_checks,
            vec![CheckName::PostgresHashLabel, CheckName::ServiceMonitors]
        );

        let mut topology = Topology::matrix_stack().unwrap();
        config.apply_noqa_paths(&mut topology).unwrap();
        assert!(topology
            .get("synapse")
            .unwrap()
            .is_path_exempt("/usr/local/share/synapse/templates/a.html"));
    }

    #[test]
    fn load_rejects_unknown_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verify.yaml");
        fs::write(&path, "disabledChecks: [everything]\n").unwrap();

        let err = load_config(Some(path)).unwrap_err();
        assert!(matches!(err, Error::Config { .. }), "{err}");
    }

    #[test]
    fn load_missing_explicit_file_fails() {
        let err = load_config(Some(PathBuf::from("/nonexistent/verify.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn noqa_for_unknown_deployable_fails() {
        let config = VerifyConfig {
            noqa_paths: BTreeMap::from([("sliding-sync".to_string(), vec!["/data".to_string()])]),
            ..Default::default()
        };
        let mut topology = Topology::matrix_stack().unwrap();
        let err = config.apply_noqa_paths(&mut topology).unwrap_err();
        assert!(matches!(err, Error::Verify(_)));
    }
}
