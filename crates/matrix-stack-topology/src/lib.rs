//! Deployable topology of the matrix-stack chart
//!
//! The static component table is declared in [`declaration`], validated into
//! a [`Topology`] once, and then used read-only to resolve which deployables
//! a render enables and to assign each rendered manifest to its owner.

#![deny(missing_docs)]

pub mod classifier;
pub mod declaration;
pub mod deployable;
pub mod registry;

pub use classifier::{Classifier, Ownership};
pub use declaration::{ComponentDecl, SubComponentDecl};
pub use deployable::{
    ComponentDetails, DeployableDetails, DeployableId, DeployableKind, SubComponentDetails,
};
pub use registry::Topology;
