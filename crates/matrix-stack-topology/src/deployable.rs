//! Deployable identities and their configuration
//!
//! A deployable is anything the chart may render: a top-level component, a
//! shared infrastructure component, or a sub-component. Identity and
//! configuration are split: [`DeployableId`] is the only thing stored in sets
//! and used as a map key, [`DeployableDetails`] is looked up through it.

use std::borrow::Borrow;
use std::collections::BTreeSet;

use serde::Serialize;

/// Identity of a deployable: its name, nothing else
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeployableId(String);

impl DeployableId {
    /// Create an id from a deployable name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The deployable name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for DeployableId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeployableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration of one deployable
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployableDetails {
    /// Identity
    pub id: DeployableId,
    /// Key under which its Helm values live (relative to the parent for
    /// sub-components)
    pub helm_key: String,
    /// Talks to Postgres
    pub has_db: bool,
    /// Runs an image the chart lets users override
    pub has_image: bool,
    /// Renders an Ingress
    pub has_ingress: bool,
    /// Renders Deployments/StatefulSets/Jobs
    pub has_workloads: bool,
    /// Renders a ServiceMonitor
    pub has_service_monitor: bool,
    /// Mount paths exempt from the mount consistency check
    pub paths_consistency_noqa: BTreeSet<String>,
    /// Component or sub-component specifics
    pub kind: DeployableKind,
}

/// The two deployable variants
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum DeployableKind {
    /// Top-level or shared component
    Component(ComponentDetails),
    /// Part of a component
    SubComponent(SubComponentDetails),
}

/// Component-only configuration
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDetails {
    /// Shared infrastructure rather than something a values file enables
    pub is_shared: bool,
    /// Sub-components, in declaration order
    pub sub_components: Vec<DeployableId>,
    /// Shared components this one pulls in
    pub shared_components: Vec<DeployableId>,
    /// Itself plus every shared component it transitively depends on
    pub active_component_names: BTreeSet<String>,
    /// CI values files exercising it
    pub values_files: Vec<String>,
    /// CI values files exercising its secret handling
    pub secret_values_files: Vec<String>,
}

/// Sub-component-only configuration
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubComponentDetails {
    /// Owning component
    pub parent: DeployableId,
    /// Helm key of the owning component
    pub parent_helm_key: String,
    /// Configured through its parent's values; skipped when visiting
    /// deployables for values mutation
    pub uses_parent_properties: bool,
}

impl DeployableDetails {
    /// The deployable name
    pub fn name(&self) -> &str {
        self.id.as_str()
    }

    /// Component specifics, if this is a component
    pub fn as_component(&self) -> Option<&ComponentDetails> {
        match &self.kind {
            DeployableKind::Component(c) => Some(c),
            DeployableKind::SubComponent(_) => None,
        }
    }

    /// Sub-component specifics, if this is a sub-component
    pub fn as_sub_component(&self) -> Option<&SubComponentDetails> {
        match &self.kind {
            DeployableKind::SubComponent(s) => Some(s),
            DeployableKind::Component(_) => None,
        }
    }

    /// Whether a mounted path is exempt from the consistency check.
    ///
    /// Entries match the path exactly or as a directory prefix.
    pub fn is_path_exempt(&self, path: &str) -> bool {
        self.paths_consistency_noqa.iter().any(|exempt| {
            path == exempt
                || path
                    .strip_prefix(exempt.as_str())
                    .is_some_and(|rest| rest.starts_with('/') || exempt.ends_with('/'))
        })
    }
}

/// Camel-case a hyphenated name: `init-secrets` -> `initSecrets`
pub(crate) fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    fn details(name: &str, noqa: &[&str]) -> DeployableDetails {
        DeployableDetails {
            id: DeployableId::new(name),
            helm_key: camel_case(name),
            has_db: false,
            has_image: true,
            has_ingress: true,
            has_workloads: true,
            has_service_monitor: true,
            paths_consistency_noqa: noqa.iter().map(|s| s.to_string()).collect(),
            kind: DeployableKind::Component(ComponentDetails {
                is_shared: false,
                sub_components: vec![],
                shared_components: vec![],
                active_component_names: BTreeSet::from([name.to_string()]),
                values_files: vec![],
                secret_values_files: vec![],
            }),
        }
    }

    /// Story: two ids with the same name are the same deployable, so sets of
    /// ids deduplicate coverage no matter where the id came from
    #[test]
    fn story_identity_is_the_name() {
        let mut seen = HashSet::new();
        seen.insert(DeployableId::new("postgres"));
        seen.insert(DeployableId::new("postgres".to_string()));
        assert_eq!(seen.len(), 1);
        assert!(seen.contains("postgres"));
    }

    #[rstest]
    #[case("/etc/nginx", true)]
    #[case("/etc/nginx/nginx.conf", true)]
    #[case("/etc/nginx-extra/a.conf", false)]
    #[case("/etc", false)]
    fn test_noqa_paths_match_exactly_or_as_directory(#[case] path: &str, #[case] exempt: bool) {
        let d = details("element-web", &["/etc/nginx"]);
        assert_eq!(d.is_path_exempt(path), exempt);
    }

    #[rstest]
    #[case("synapse", "synapse")]
    #[case("init-secrets", "initSecrets")]
    #[case("matrix-authentication-service", "matrixAuthenticationService")]
    fn test_camel_case(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(camel_case(name), expected);
    }

    #[test]
    fn test_variant_accessors() {
        let d = details("haproxy", &[]);
        assert!(d.as_component().is_some());
        assert!(d.as_sub_component().is_none());
        assert_eq!(d.name(), "haproxy");
        assert_eq!(d.id.to_string(), "haproxy");
    }
}
