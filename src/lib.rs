// ============================================================================
// orgsync: organization tree reconciliation
// ============================================================================
//
// Takes a client-edited organization tree (company, units, sectors, roles,
// collaborators) and reconciles it against persisted rows: identity
// classification, lookup-or-create of shared reference data, per-collection
// insert/update/delete, and FK-safe cascade deletion.
//
// ============================================================================

pub mod config;
pub mod core;
pub mod facade;
pub mod identity;
pub mod model;
pub mod report;
pub mod storage;
pub mod sync;

// Re-export main types for convenience
pub use config::{ReconcileConfig, TransactionMode};
pub use core::{Collection, Fields, Record, Result, RowId, StoreError, SyncError, SyncResult, Value};
pub use facade::Reconciler;
pub use identity::{ClientId, Identity, IdentityClassifier, PLACEHOLDER_ID_THRESHOLD};
pub use model::{CollaboratorInput, CompanyInput, OrganizationTree, RoleInput, RoleRef, SectorInput, UnitInput};
pub use report::{
    CascadeStep, ChangeCounts, DeleteReport, EntityKind, Failure, FailureKind, Outcome, ReconcileReport,
    StepOutcome,
};
pub use storage::{EntityStore, Filter, InMemoryStore, SnapshotFile, StoreSnapshot, TimeoutStore};
