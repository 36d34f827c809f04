//! Mount consistency
//!
//! For every container of every workload, the keys its Secret and ConfigMap
//! mounts expose must each be referenced by the container (env values,
//! command, args) or by a ConfigMap it mounts, and every path those texts
//! reference under a mount directory must be something that is mounted.
//!
//! `rendered-config` emptyDir volumes are filled at start-up by a
//! `render-config` init container. Their single key is inferred from that
//! container's `-output` flag. Containers mounting such a volume are not
//! checked for unused keys. `render-config` is still checked for dangling
//! references, against the union of its own inputs and everything its
//! consumers mount.

use std::collections::BTreeSet;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use matrix_stack_common::{
    ConfigMap, Container, Error, Manifest, Result, Secret, VolumeMount, VolumeSource, Workload,
    ANNOTATION_HELM_HOOK, ANNOTATION_HELM_HOOK_WEIGHT,
};
use matrix_stack_topology::{Ownership, Topology};
use tracing::{debug, trace};

use crate::scan::{basename, parent_dir, KeyMatcher, ReferenceScanner};
use crate::violation::{CheckName, Violation, ViolationKind};

/// emptyDir volume filled by the `render-config` init container
pub const RENDERED_CONFIG_VOLUME: &str = "rendered-config";

/// Init container that renders config files from templates and secrets
pub const RENDER_CONFIG_CONTAINER: &str = "render-config";

/// Flag of `render-config` naming the file it writes
pub const OUTPUT_FLAG: &str = "-output";

/// Hook phases whose dependencies must be created by earlier hooks
const PRE_INSTALL_UPGRADE: &str = "pre-install,pre-upgrade";

/// Verifies mounted keys against their references
pub struct MountVerifier<'a> {
    manifests: &'a [Manifest],
    external_secrets: &'a [Manifest],
    exemptions: Option<(&'a Topology, &'a Ownership)>,
}

/// A key exposed at a mount, with the directory references are scanned in
#[derive(Clone, Debug, PartialEq, Eq)]
struct MountedKey {
    path: String,
    parent: String,
}

/// What backs one volume mount
enum Backing<'a> {
    Secret { secret: &'a Secret, rendered: bool },
    ConfigMap(&'a ConfigMap),
    RenderedConfig,
    Unchecked,
}

/// Everything one container mounts
#[derive(Default)]
struct ContainerMounts<'a> {
    keys: Vec<MountedKey>,
    mount_paths: Vec<&'a str>,
    config_maps: Vec<&'a ConfigMap>,
    uses_rendered_config: bool,
}

impl<'a> ContainerMounts<'a> {
    fn add(&mut self, mount: &VolumeMount, data_keys: BTreeSet<&str>) {
        match mount.sub_path {
            Some(_) => self.keys.push(MountedKey {
                path: mount.mount_path.clone(),
                parent: parent_dir(&mount.mount_path).to_string(),
            }),
            None => {
                let mount_path = mount.mount_path.trim_end_matches('/');
                self.keys.extend(data_keys.into_iter().map(|key| MountedKey {
                    path: format!("{mount_path}/{key}"),
                    parent: mount_path.to_string(),
                }))
            }
        }
    }

    fn has_key(&self, path: &str) -> bool {
        self.keys.iter().any(|k| k.path == path)
    }
}

/// Where a text fragment was found, for diagnostics
struct TextSource<'a> {
    origin: String,
    text: &'a str,
}

impl<'a> MountVerifier<'a> {
    /// Verify `manifests`, resolving Secrets not rendered by the chart from
    /// `external_secrets`
    pub fn new(manifests: &'a [Manifest], external_secrets: &'a [Manifest]) -> Self {
        Self {
            manifests,
            external_secrets,
            exemptions: None,
        }
    }

    /// Apply the owning deployable's noqa paths
    pub fn with_exemptions(mut self, topology: &'a Topology, ownership: &'a Ownership) -> Self {
        self.exemptions = Some((topology, ownership));
        self
    }

    /// Run the check over every workload.
    ///
    /// Unresolvable references (a mount without a volume, a Secret or
    /// ConfigMap that exists nowhere, a `rendered-config` volume without its
    /// `render-config` contract) are errors; everything else is collected.
    pub fn verify(&self) -> Result<Vec<Violation>> {
        let mut violations = Vec::new();
        for (index, manifest) in self.manifests.iter().enumerate() {
            if let Some(workload) = manifest.as_workload() {
                violations.extend(self.verify_workload(index, manifest, workload)?);
            }
        }
        debug!(violations = violations.len(), "mount consistency verified");
        Ok(violations)
    }

    fn verify_workload(
        &self,
        index: usize,
        manifest: &Manifest,
        workload: &'a Workload,
    ) -> Result<Vec<Violation>> {
        let workload_id = manifest.id();
        let hook_weight = hook_weight(manifest)?;
        let is_exempt = |path: &str| self.is_exempt(index, path);

        let mut violations = Vec::new();
        let mut hook_checked = BTreeSet::new();

        for container in workload.pod().all_containers() {
            trace!(workload = %workload_id, container = %container.name, "checking mounts");
            let mut mounts = ContainerMounts::default();

            for mount in &container.volume_mounts {
                match self.backing(&workload_id, workload, mount)? {
                    Backing::Secret { secret, rendered } => {
                        let id = format!("Secret/{}", object_name(&secret.metadata));
                        if rendered && hook_checked.insert(id) {
                            violations.extend(check_hook_order(
                                &workload_id,
                                hook_weight,
                                "Secret",
                                &secret.metadata,
                            ));
                        }
                        mounts.mount_paths.push(&mount.mount_path);
                        mounts.add(mount, secret.keys());
                    }
                    Backing::ConfigMap(config_map) => {
                        let id = format!("ConfigMap/{}", object_name(&config_map.metadata));
                        if hook_checked.insert(id) {
                            violations.extend(check_hook_order(
                                &workload_id,
                                hook_weight,
                                "ConfigMap",
                                &config_map.metadata,
                            ));
                        }
                        mounts.mount_paths.push(&mount.mount_path);
                        mounts.config_maps.push(config_map);
                        mounts.add(mount, config_map.keys());
                    }
                    Backing::RenderedConfig => {
                        let output = rendered_config_output(&workload_id, workload)?;
                        mounts.uses_rendered_config = true;
                        mounts.mount_paths.push(&mount.mount_path);
                        mounts.keys.push(rendered_config_key(mount, output));
                    }
                    Backing::Unchecked => {}
                }
            }

            violations.extend(uniqueness(&workload_id, container, &mounts));

            let sources = text_sources(container, &mounts);
            if !mounts.uses_rendered_config {
                violations.extend(check_unused(&workload_id, container, &mounts, &sources, &is_exempt)?);
            }

            let is_render_config = container.name == RENDER_CONFIG_CONTAINER;
            if is_render_config {
                let inputs = self.render_config_inputs(&workload_id, workload)?;
                if inputs.is_empty() {
                    violations.push(
                        Violation::new(
                            CheckName::Mounts,
                            ViolationKind::RenderConfigWithoutInputs,
                            &workload_id,
                            format!(
                                "no Secret or ConfigMap is mounted by the containers using {RENDERED_CONFIG_VOLUME}"
                            ),
                        )
                        .in_container(&container.name),
                    );
                }
                mounts.keys.extend(inputs);
            }
            if is_render_config || !mounts.uses_rendered_config {
                violations.extend(check_dangling(&workload_id, container, &mounts, &sources, &is_exempt)?);
            }
        }
        Ok(violations)
    }

    fn is_exempt(&self, index: usize, path: &str) -> bool {
        let Some((topology, ownership)) = self.exemptions else {
            return false;
        };
        ownership
            .owner(index)
            .and_then(|owner| topology.get(owner.as_str()).ok())
            .is_some_and(|details| details.is_path_exempt(path))
    }

    fn backing(
        &self,
        workload_id: &str,
        workload: &'a Workload,
        mount: &VolumeMount,
    ) -> Result<Backing<'a>> {
        let pod = workload.pod();
        let volume = pod.volume(&mount.name).ok_or_else(|| {
            Error::mount(
                workload_id,
                format!(
                    "no volume named '{}' for mount path {} in [{}]",
                    mount.name,
                    mount.mount_path,
                    pod.volumes
                        .iter()
                        .map(|v| v.name.as_str())
                        .collect::<Vec<_>>()
                        .join(",")
                ),
            )
        })?;

        match volume.source() {
            VolumeSource::Secret(name) => {
                if let Some(secret) = find_secret(self.manifests, name) {
                    return Ok(Backing::Secret { secret, rendered: true });
                }
                find_secret(self.external_secrets, name)
                    .map(|secret| Backing::Secret { secret, rendered: false })
                    .ok_or_else(|| {
                        Error::mount(
                            workload_id,
                            format!("Secret {name} is neither rendered nor provided externally"),
                        )
                    })
            }
            VolumeSource::ConfigMap(name) => self
                .manifests
                .iter()
                .find_map(|m| match m {
                    Manifest::ConfigMap(cm) if object_name(&cm.metadata) == name => Some(cm),
                    _ => None,
                })
                .map(Backing::ConfigMap)
                .ok_or_else(|| Error::mount(workload_id, format!("ConfigMap {name} is not rendered"))),
            VolumeSource::EmptyDir if volume.name == RENDERED_CONFIG_VOLUME => {
                Ok(Backing::RenderedConfig)
            }
            VolumeSource::EmptyDir | VolumeSource::Other => Ok(Backing::Unchecked),
        }
    }

    /// Keys the main containers consuming `rendered-config` mount from
    /// Secrets and ConfigMaps
    fn render_config_inputs(
        &self,
        workload_id: &str,
        workload: &'a Workload,
    ) -> Result<Vec<MountedKey>> {
        let mut inputs = ContainerMounts::default();
        for consumer in workload
            .pod()
            .containers
            .iter()
            .filter(|c| c.mounts_volume(RENDERED_CONFIG_VOLUME))
        {
            for mount in &consumer.volume_mounts {
                match self.backing(workload_id, workload, mount)? {
                    Backing::Secret { secret, .. } => inputs.add(mount, secret.keys()),
                    Backing::ConfigMap(config_map) => inputs.add(mount, config_map.keys()),
                    Backing::RenderedConfig | Backing::Unchecked => {}
                }
            }
        }
        Ok(inputs.keys)
    }
}

fn find_secret<'m>(manifests: &'m [Manifest], name: &str) -> Option<&'m Secret> {
    manifests.iter().find_map(|m| match m {
        Manifest::Secret(secret) if object_name(&secret.metadata) == name => Some(secret),
        _ => None,
    })
}

fn object_name(metadata: &ObjectMeta) -> &str {
    metadata.name.as_deref().unwrap_or_default()
}

/// The file `render-config` writes, from the argument after `-output`
fn rendered_config_output<'w>(workload_id: &str, workload: &'w Workload) -> Result<&'w str> {
    workload
        .pod()
        .init_container(RENDER_CONFIG_CONTAINER)
        .and_then(|c| {
            let position = c.command.iter().position(|arg| arg == OUTPUT_FLAG)?;
            c.command.get(position + 1)
        })
        .map(String::as_str)
        .ok_or_else(|| {
            Error::mount(
                workload_id,
                format!(
                    "has a {RENDERED_CONFIG_VOLUME} volume but no {RENDER_CONFIG_CONTAINER} init container with an {OUTPUT_FLAG} flag"
                ),
            )
        })
}

fn rendered_config_key(mount: &VolumeMount, output: &str) -> MountedKey {
    match mount.sub_path {
        Some(_) => MountedKey {
            path: mount.mount_path.clone(),
            parent: parent_dir(&mount.mount_path).to_string(),
        },
        None => {
            let mount_path = mount.mount_path.trim_end_matches('/');
            MountedKey {
                path: format!("{mount_path}/{}", basename(output)),
                parent: mount_path.to_string(),
            }
        }
    }
}

/// Weight of a pre-install/pre-upgrade hook workload
fn hook_weight(manifest: &Manifest) -> Result<Option<i64>> {
    let is_pre_hook = manifest
        .annotation(ANNOTATION_HELM_HOOK)
        .is_some_and(|hook| hook.contains(PRE_INSTALL_UPGRADE));
    if !is_pre_hook {
        return Ok(None);
    }
    match manifest.annotation(ANNOTATION_HELM_HOOK_WEIGHT) {
        None => Ok(Some(0)),
        Some(weight) => weight.trim().parse::<i64>().map(Some).map_err(|_| {
            Error::manifest(
                manifest.id(),
                format!("{ANNOTATION_HELM_HOOK_WEIGHT} '{weight}' is not an integer"),
            )
        }),
    }
}

fn check_hook_order(
    workload_id: &str,
    hook_weight: Option<i64>,
    kind: &str,
    metadata: &ObjectMeta,
) -> Option<Violation> {
    let hook_weight = hook_weight?;
    let dependency = format!("{kind}/{}", object_name(metadata));
    let declared = metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_HELM_HOOK_WEIGHT));

    let message = match declared.map(|w| (w, w.trim().parse::<i64>())) {
        None => format!("{dependency} used by hook {workload_id} has no hook weight"),
        Some((raw, Err(_))) => {
            format!("{dependency} used by hook {workload_id} has a non-integer hook weight '{raw}'")
        }
        Some((_, Ok(weight))) if weight < hook_weight => return None,
        Some((_, Ok(weight))) => format!(
            "{dependency} has the same or a higher hook weight ({weight}) than {workload_id} ({hook_weight}) which uses it"
        ),
    };
    Some(Violation::new(CheckName::Mounts, ViolationKind::HookOrdering, workload_id, message).at_path(dependency))
}

fn uniqueness(workload_id: &str, container: &Container, mounts: &ContainerMounts<'_>) -> Vec<Violation> {
    let mut violations = Vec::new();

    let mut seen = BTreeSet::new();
    let mut reported = BTreeSet::new();
    for key in &mounts.keys {
        if !seen.insert(key.path.as_str()) && reported.insert(key.path.as_str()) {
            violations.push(
                Violation::new(
                    CheckName::Mounts,
                    ViolationKind::DuplicateMountedKey,
                    workload_id,
                    format!("{} is exposed by more than one mount", key.path),
                )
                .in_container(&container.name)
                .at_path(&key.path),
            );
        }
    }

    let mut seen = BTreeSet::new();
    let mut reported = BTreeSet::new();
    for path in &mounts.mount_paths {
        if !seen.insert(*path) && reported.insert(*path) {
            violations.push(
                Violation::new(
                    CheckName::Mounts,
                    ViolationKind::DuplicateMountPath,
                    workload_id,
                    format!("mount path {path} is used by more than one mount"),
                )
                .in_container(&container.name)
                .at_path(*path),
            );
        }
    }
    violations
}

fn text_sources<'c>(container: &'c Container, mounts: &ContainerMounts<'c>) -> Vec<TextSource<'c>> {
    let own = container.text_sources().into_iter().map(|text| TextSource {
        origin: format!("container {}", container.name),
        text,
    });
    let config_files = mounts.config_maps.iter().copied().flat_map(|cm| {
        let name = object_name(&cm.metadata);
        cm.data.iter().map(move |(file, content)| TextSource {
            origin: format!("ConfigMap {name}/{file}"),
            text: content.as_str(),
        })
    });
    own.chain(config_files).collect()
}

fn check_unused(
    workload_id: &str,
    container: &Container,
    mounts: &ContainerMounts<'_>,
    sources: &[TextSource<'_>],
    is_exempt: &dyn Fn(&str) -> bool,
) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();
    for key in mounts.keys.iter().filter(|k| !is_exempt(&k.path)) {
        let matcher = KeyMatcher::new(&key.path)?;
        if sources.iter().any(|s| matcher.is_referenced_in(s.text)) {
            continue;
        }
        let config_maps = mounts
            .config_maps
            .iter()
            .map(|cm| object_name(&cm.metadata))
            .collect::<Vec<_>>()
            .join(",");
        violations.push(
            Violation::new(
                CheckName::Mounts,
                ViolationKind::UnusedMount,
                workload_id,
                format!(
                    "{} is mounted but no env variable, command, args or mounted ConfigMap [{config_maps}] references it",
                    key.path
                ),
            )
            .in_container(&container.name)
            .at_path(&key.path),
        );
    }
    Ok(violations)
}

fn check_dangling(
    workload_id: &str,
    container: &Container,
    mounts: &ContainerMounts<'_>,
    sources: &[TextSource<'_>],
    is_exempt: &dyn Fn(&str) -> bool,
) -> Result<Vec<Violation>> {
    let mut parents: Vec<&str> = Vec::new();
    for key in mounts.keys.iter().filter(|k| !is_exempt(&k.path)) {
        if !parents.contains(&key.parent.as_str()) {
            parents.push(&key.parent);
        }
    }

    let mut violations = Vec::new();
    let mut reported = BTreeSet::new();
    for parent in parents {
        let scanner = ReferenceScanner::new(parent)?;
        for source in sources {
            for reference in scanner.references(source.text) {
                if mounts.has_key(reference) || is_exempt(reference) {
                    continue;
                }
                if reported.insert(reference.to_string()) {
                    violations.push(
                        Violation::new(
                            CheckName::Mounts,
                            ViolationKind::DanglingReference,
                            workload_id,
                            format!(
                                "{reference} is referenced by {} but no mounted Secret or ConfigMap provides it",
                                source.origin
                            ),
                        )
                        .in_container(&container.name)
                        .at_path(reference),
                    );
                }
            }
        }
    }
    Ok(violations)
}
