//! Manifest ownership classification
//!
//! Every rendered manifest belongs to exactly one deployable. Ownership is
//! decided from the `app.kubernetes.io/name` label (never the resource name,
//! which carries the release prefix) against the deployables resolved for
//! the render. Anything other than exactly one owner means the topology table
//! and the chart's naming convention disagree, which is fatal.

use std::collections::BTreeSet;

use matrix_stack_common::{Error, Manifest, Result, LABEL_NAME};
use tracing::{debug, trace};

use crate::{DeployableId, Topology};

/// Assigns manifests to deployables
#[derive(Clone, Debug)]
pub struct Classifier<'t> {
    topology: &'t Topology,
    candidates: BTreeSet<DeployableId>,
}

impl<'t> Classifier<'t> {
    /// Classify against a set of candidate deployables, usually the output
    /// of [`Topology::resolve`]
    pub fn new(topology: &'t Topology, candidates: BTreeSet<DeployableId>) -> Self {
        Self {
            topology,
            candidates,
        }
    }

    /// The single deployable owning a manifest
    pub fn classify(&self, manifest: &Manifest) -> Result<DeployableId> {
        let manifest_id = manifest.id();
        let name = manifest.label(LABEL_NAME).ok_or_else(|| {
            Error::ownership(&manifest_id, format!("missing label {LABEL_NAME}"))
        })?;

        let owners: Vec<&DeployableId> = self
            .candidates
            .iter()
            .filter(|id| self.topology.owns_manifest_named(id, name))
            .collect();

        match owners.as_slice() {
            [owner] => {
                trace!(manifest = %manifest_id, owner = %owner, "classified");
                Ok((*owner).clone())
            }
            [] => Err(Error::ownership(
                &manifest_id,
                format!("no deployable claims {LABEL_NAME}={name}"),
            )),
            [first, second, ..] => Err(Error::ownership(
                &manifest_id,
                format!("{LABEL_NAME}={name} claimed by both {first} and {second}"),
            )),
        }
    }

    /// Classify a whole render, failing on the first unowned or
    /// ambiguously owned manifest
    pub fn classify_all(&self, manifests: &[Manifest]) -> Result<Ownership> {
        let owners = manifests
            .iter()
            .map(|m| self.classify(m))
            .collect::<Result<Vec<_>>>()?;
        debug!(manifests = owners.len(), "classified render");
        Ok(Ownership { owners })
    }
}

/// Owner of each manifest of a render, index-aligned with the manifests
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ownership {
    owners: Vec<DeployableId>,
}

impl Ownership {
    /// Owner of the manifest at `index`
    pub fn owner(&self, index: usize) -> Option<&DeployableId> {
        self.owners.get(index)
    }

    /// `(manifest index, owner)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, &DeployableId)> {
        self.owners.iter().enumerate()
    }

    /// Deployables owning at least one manifest
    pub fn seen(&self) -> BTreeSet<&DeployableId> {
        self.owners.iter().collect()
    }

    /// Manifests owned by one deployable
    pub fn owned_by<'m>(
        &'m self,
        manifests: &'m [Manifest],
        id: &'m DeployableId,
    ) -> impl Iterator<Item = &'m Manifest> + 'm {
        manifests
            .iter()
            .zip(self.owners.iter())
            .filter(move |(_, owner)| *owner == id)
            .map(|(m, _)| m)
    }

    /// Number of classified manifests
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Whether nothing was classified
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
