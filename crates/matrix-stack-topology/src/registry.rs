//! Validated topology registry and resolver
//!
//! [`Topology`] is built once from declarations and is read-only afterwards
//! (apart from config-supplied noqa paths applied before any check runs).
//! Construction fails fast on any inconsistency in the table.

use std::collections::{BTreeMap, BTreeSet};

use matrix_stack_common::{Error, Result};
use serde_json::{Map, Value};
use tracing::debug;

use crate::declaration::{self, ComponentDecl, POSTGRES};
use crate::deployable::{
    camel_case, ComponentDetails, DeployableDetails, DeployableId, DeployableKind,
    SubComponentDetails,
};

/// All deployables of a chart, keyed by id
#[derive(Clone, Debug)]
pub struct Topology {
    deployables: BTreeMap<DeployableId, DeployableDetails>,
    /// Declaration order: each component followed by its sub-components
    order: Vec<DeployableId>,
}

impl Topology {
    /// The matrix-stack chart topology
    pub fn matrix_stack() -> Result<Self> {
        Self::new(declaration::matrix_stack())
    }

    /// Validate declarations and build the registry
    pub fn new(decls: Vec<ComponentDecl>) -> Result<Self> {
        let mut declared: BTreeMap<&str, &ComponentDecl> = BTreeMap::new();
        for decl in &decls {
            if declared.insert(decl.name, decl).is_some() {
                return Err(Error::topology_for(decl.name, "declared more than once"));
            }
        }

        for decl in &decls {
            for dep in &decl.shared_components {
                match declared.get(dep) {
                    None => {
                        return Err(Error::topology_for(
                            decl.name,
                            format!("unknown shared component '{dep}'"),
                        ))
                    }
                    Some(d) if !d.is_shared => {
                        return Err(Error::topology_for(
                            decl.name,
                            format!("'{dep}' is not a shared component"),
                        ))
                    }
                    Some(_) => {}
                }
            }

            let uses_postgres = decl.shared_components.contains(&POSTGRES);
            if decl.has_db != uses_postgres {
                return Err(Error::topology_for(
                    decl.name,
                    format!(
                        "has_db is {} but {POSTGRES} is {}among its shared components",
                        decl.has_db,
                        if uses_postgres { "" } else { "not " }
                    ),
                ));
            }
        }

        let mut deployables = BTreeMap::new();
        let mut order = Vec::new();

        for decl in &decls {
            let id = DeployableId::new(decl.name);
            let helm_key = decl
                .helm_key
                .map(str::to_string)
                .unwrap_or_else(|| camel_case(decl.name));

            let values_files = if decl.is_shared {
                vec![]
            } else {
                decl.additional_values_files
                    .iter()
                    .map(|f| f.to_string())
                    .chain(std::iter::once(format!("{}-minimal-values.yaml", decl.name)))
                    .collect()
            };

            let component = DeployableDetails {
                id: id.clone(),
                helm_key: helm_key.clone(),
                has_db: decl.has_db,
                has_image: decl.has_image,
                has_ingress: decl.has_ingress,
                has_workloads: decl.has_workloads,
                has_service_monitor: decl.has_service_monitor,
                paths_consistency_noqa: decl
                    .paths_consistency_noqa
                    .iter()
                    .map(|p| p.to_string())
                    .collect(),
                kind: DeployableKind::Component(ComponentDetails {
                    is_shared: decl.is_shared,
                    sub_components: decl
                        .sub_components
                        .iter()
                        .map(|s| DeployableId::new(s.name))
                        .collect(),
                    shared_components: decl
                        .shared_components
                        .iter()
                        .map(|s| DeployableId::new(*s))
                        .collect(),
                    active_component_names: active_names(decl, &declared),
                    values_files,
                    secret_values_files: decl
                        .secret_values_files
                        .iter()
                        .map(|f| f.to_string())
                        .collect(),
                }),
            };
            insert(&mut deployables, &mut order, component)?;

            for sub in &decl.sub_components {
                let sub_details = DeployableDetails {
                    id: DeployableId::new(sub.name),
                    helm_key: sub
                        .helm_key
                        .map(str::to_string)
                        .unwrap_or_else(|| camel_case(sub.name)),
                    has_db: sub.has_db,
                    has_image: sub.has_image,
                    has_ingress: sub.has_ingress,
                    has_workloads: sub.has_workloads,
                    has_service_monitor: sub.has_service_monitor,
                    paths_consistency_noqa: sub
                        .paths_consistency_noqa
                        .iter()
                        .map(|p| p.to_string())
                        .collect(),
                    kind: DeployableKind::SubComponent(SubComponentDetails {
                        parent: id.clone(),
                        parent_helm_key: helm_key.clone(),
                        uses_parent_properties: sub.uses_parent_properties,
                    }),
                };
                insert(&mut deployables, &mut order, sub_details)?;
            }
        }

        debug!(deployables = deployables.len(), "topology validated");
        Ok(Self { deployables, order })
    }

    /// Look up a deployable by name; unknown names are a table error
    pub fn get(&self, name: &str) -> Result<&DeployableDetails> {
        self.deployables
            .get(name)
            .ok_or_else(|| Error::topology_for(name, "not declared in the topology"))
    }

    /// Every deployable in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &DeployableDetails> {
        self.order.iter().filter_map(|id| self.deployables.get(id))
    }

    /// Top-level (non-shared) components in declaration order
    pub fn top_level_components(&self) -> impl Iterator<Item = &DeployableDetails> {
        self.iter()
            .filter(|d| d.as_component().is_some_and(|c| !c.is_shared))
    }

    /// Closed set of deployables in play when the named top-level
    /// components are enabled: the components, their shared dependencies
    /// (transitively) and every sub-component of all of those
    pub fn resolve<I, S>(&self, active: I) -> Result<BTreeSet<DeployableId>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolved = BTreeSet::new();
        for name in active {
            let name = name.as_ref();
            let component = self.get(name)?.as_component().ok_or_else(|| {
                Error::topology_for(name, "is a sub-component and cannot be enabled on its own")
            })?;
            for active_name in &component.active_component_names {
                let included = self.get(active_name)?;
                resolved.insert(included.id.clone());
                if let Some(c) = included.as_component() {
                    resolved.extend(c.sub_components.iter().cloned());
                }
            }
        }
        debug!(
            deployables = ?resolved.iter().map(DeployableId::as_str).collect::<Vec<_>>(),
            "resolved active topology"
        );
        Ok(resolved)
    }

    /// Whether the deployable claims a manifest with this
    /// `app.kubernetes.io/name`.
    ///
    /// Sub-components claim names starting with their own name. Components
    /// claim names starting with theirs unless one of their sub-components
    /// already does.
    pub fn owns_manifest_named(&self, id: &DeployableId, manifest_name: &str) -> bool {
        let Some(details) = self.deployables.get(id) else {
            return false;
        };
        if !manifest_name.starts_with(details.name()) {
            return false;
        }
        match &details.kind {
            DeployableKind::SubComponent(_) => true,
            DeployableKind::Component(c) => !c
                .sub_components
                .iter()
                .any(|sub| manifest_name.starts_with(sub.as_str())),
        }
    }

    /// The component a CI values file exercises
    pub fn component_for_values_file(&self, values_file: &str) -> Result<&DeployableDetails> {
        self.iter()
            .find(|d| {
                d.as_component().is_some_and(|c| {
                    c.values_files.iter().any(|f| f == values_file)
                        || c.secret_values_files.iter().any(|f| f == values_file)
                })
            })
            .ok_or_else(|| {
                Error::topology_for(values_file, "values file is not mapped to any component")
            })
    }

    /// Every values file of every top-level component
    pub fn values_files_to_test(&self) -> Vec<&str> {
        self.top_level_components()
            .filter_map(DeployableDetails::as_component)
            .flat_map(|c| c.values_files.iter().map(String::as_str))
            .collect()
    }

    /// Every secret-handling values file
    pub fn secret_values_files_to_test(&self) -> Vec<&str> {
        self.top_level_components()
            .filter_map(DeployableDetails::as_component)
            .flat_map(|c| c.secret_values_files.iter().map(String::as_str))
            .collect()
    }

    /// Values files of components that render an Ingress
    pub fn values_files_with_ingresses(&self) -> Vec<&str> {
        self.top_level_components()
            .filter(|d| d.has_ingress)
            .filter_map(DeployableDetails::as_component)
            .flat_map(|c| c.values_files.iter().map(String::as_str))
            .collect()
    }

    /// Deployables of `ids` whose own Helm values should be visited when
    /// mutating values, in declaration order.
    ///
    /// Sub-components configured through their parent are skipped unless
    /// `override_uses_parent_properties` is set.
    pub fn deployables_for_values_mutation(
        &self,
        ids: &BTreeSet<DeployableId>,
        override_uses_parent_properties: bool,
    ) -> Vec<&DeployableDetails> {
        self.iter()
            .filter(|d| ids.contains(&d.id))
            .filter(|d| {
                override_uses_parent_properties
                    || !d.as_sub_component().is_some_and(|s| s.uses_parent_properties)
            })
            .collect()
    }

    /// Mutable Helm values fragment of a deployable, created empty if absent
    pub fn helm_values_fragment<'v>(
        &self,
        id: &DeployableId,
        values: &'v mut Value,
    ) -> Result<&'v mut Map<String, Value>> {
        let details = self.get(id.as_str())?;
        let root = as_mapping(values, "<root>")?;
        match &details.kind {
            DeployableKind::Component(_) => child_mapping(root, &details.helm_key),
            DeployableKind::SubComponent(sub) => {
                let parent = child_mapping(root, &sub.parent_helm_key)?;
                child_mapping(parent, &details.helm_key)
            }
        }
    }

    /// Extend a deployable's noqa paths
    pub fn add_noqa_paths<I>(&mut self, name: &str, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        let details = self
            .deployables
            .get_mut(name)
            .ok_or_else(|| Error::topology_for(name, "not declared in the topology"))?;
        details.paths_consistency_noqa.extend(paths);
        Ok(())
    }
}

fn insert(
    deployables: &mut BTreeMap<DeployableId, DeployableDetails>,
    order: &mut Vec<DeployableId>,
    details: DeployableDetails,
) -> Result<()> {
    let id = details.id.clone();
    if deployables.insert(id.clone(), details).is_some() {
        return Err(Error::topology_for(id.as_str(), "declared more than once"));
    }
    order.push(id);
    Ok(())
}

fn active_names(root: &ComponentDecl, declared: &BTreeMap<&str, &ComponentDecl>) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut pending = vec![root.name];
    while let Some(name) = pending.pop() {
        if !names.insert(name.to_string()) {
            continue;
        }
        if let Some(decl) = declared.get(name) {
            pending.extend(decl.shared_components.iter().copied());
        }
    }
    names
}

fn as_mapping<'v>(value: &'v mut Value, key: &str) -> Result<&'v mut Map<String, Value>> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    value
        .as_object_mut()
        .ok_or_else(|| Error::topology_for(key, "Helm values fragment is not a mapping"))
}

fn child_mapping<'v>(
    parent: &'v mut Map<String, Value>,
    key: &str,
) -> Result<&'v mut Map<String, Value>> {
    let child = parent
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    as_mapping(child, key)
}
