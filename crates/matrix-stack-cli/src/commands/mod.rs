//! CLI commands

use std::io::Read;
use std::path::Path;

use clap::ValueEnum;
use matrix_stack_common::manifest::parse_manifests;
use matrix_stack_common::Manifest;
use tracing::debug;

use crate::{Error, Result};

pub mod check;
pub mod topology;

/// Path argument meaning standard input
pub const STDIN: &str = "-";

/// Output format for reports and listings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// JSON
    Json,
    /// YAML
    Yaml,
}

/// Read a file, or standard input for `-`
pub fn read_input(path: &Path) -> Result<String> {
    if path == Path::new(STDIN) {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        return Ok(input);
    }
    std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Load every document of one or more rendered YAML streams
pub fn load_manifests<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let loaded = parse_manifests(&read_input(path)?)?;
        debug!(path = %path.display(), documents = loaded.len(), "loaded manifests");
        manifests.extend(loaded);
    }
    Ok(manifests)
}

/// Serialize `value` in a structured format
pub fn render_structured<T: serde::Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml | OutputFormat::Text => Ok(serde_yaml::to_string(value)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_manifests_concatenates_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.yaml");
        let second = dir.path().join("b.yaml");
        fs::write(&first, "apiVersion: v1\nkind: Secret\nmetadata:\n  name: a\n---\n").unwrap();
        fs::write(
            &second,
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: b\n---\napiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: c\n",
        )
        .unwrap();

        let manifests = load_manifests(&[first, second]).unwrap();
        let ids: Vec<_> = manifests.iter().map(Manifest::id).collect();
        assert_eq!(ids, vec!["Secret/a", "ConfigMap/b", "ServiceAccount/c"]);
    }

    #[test]
    fn load_manifests_reports_missing_file() {
        let err = load_manifests(&[Path::new("/nonexistent/render.yaml")]).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn render_structured_formats() {
        let value = serde_json::json!({"name": "synapse"});
        assert_eq!(render_structured(&value, OutputFormat::Yaml).unwrap(), "name: synapse\n");
        assert_eq!(
            render_structured(&value, OutputFormat::Json).unwrap(),
            "{\n  \"name\": \"synapse\"\n}"
        );
    }
}
