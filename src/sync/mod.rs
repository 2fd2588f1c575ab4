//! Per-stage synchronizers driven by the reconciler.

pub mod cascade;
pub mod collaborators;
pub mod reference;
pub mod units;

pub use cascade::CascadePlanner;
pub use collaborators::{CollaboratorIdMap, CollaboratorSynchronizer};
pub use reference::{ReferenceMaps, ReferenceResolver};
pub use units::{UnitIdMap, UnitSynchronizer};
