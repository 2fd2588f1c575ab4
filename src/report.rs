//! Structured results handed back to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{Level, event};
use uuid::Uuid;

use crate::core::RowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Company,
    Sector,
    Role,
    Unit,
    Collaborator,
    Form,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Company => "company",
            EntityKind::Sector => "sector",
            EntityKind::Role => "role",
            EntityKind::Unit => "unit",
            EntityKind::Collaborator => "collaborator",
            EntityKind::Form => "form",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A single entity operation failed; the run continued.
    PartialEntity,
    /// A name could not be mapped to an id; the reference was dropped.
    UnresolvedReference,
    /// A delete reported success but removed nothing.
    CascadeVerification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub entity: EntityKind,
    pub identifier: String,
    pub kind: FailureKind,
    pub reason: String,
}

impl Failure {
    pub fn partial(entity: EntityKind, identifier: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            entity,
            identifier: identifier.into(),
            kind: FailureKind::PartialEntity,
            reason: reason.to_string(),
        }
    }

    pub fn unresolved(entity: EntityKind, identifier: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            entity,
            identifier: identifier.into(),
            kind: FailureKind::UnresolvedReference,
            reason: reason.to_string(),
        }
    }

    pub fn cascade(entity: EntityKind, identifier: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            entity,
            identifier: identifier.into(),
            kind: FailureKind::CascadeVerification,
            reason: reason.to_string(),
        }
    }

    pub fn is_warning(&self) -> bool {
        self.kind == FailureKind::UnresolvedReference
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {}", self.entity, self.identifier, self.reason)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

/// Accumulates failures and row changes over one run. Every recorded
/// failure is also logged.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    failures: Vec<Failure>,
    changes: BTreeMap<EntityKind, ChangeCounts>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, failure: Failure) {
        if failure.is_warning() {
            event!(Level::WARN, entity = %failure.entity, identifier = %failure.identifier, reason = %failure.reason, "reference dropped");
        } else {
            event!(Level::ERROR, entity = %failure.entity, identifier = %failure.identifier, reason = %failure.reason, kind = ?failure.kind, "entity reconciliation failed");
        }
        self.failures.push(failure);
    }

    pub fn inserted(&mut self, entity: EntityKind) {
        self.changes.entry(entity).or_default().inserted += 1;
    }

    pub fn updated(&mut self, entity: EntityKind) {
        self.changes.entry(entity).or_default().updated += 1;
    }

    pub fn deleted(&mut self, entity: EntityKind, count: u64) {
        if count > 0 {
            self.changes.entry(entity).or_default().deleted += count;
        }
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn changes(&self) -> &BTreeMap<EntityKind, ChangeCounts> {
        &self.changes
    }

    /// Whether any failure other than a dropped reference was recorded.
    pub fn has_errors(&self) -> bool {
        self.failures.iter().any(|f| !f.is_warning())
    }

    pub fn into_parts(self) -> (Vec<Failure>, BTreeMap<EntityKind, ChangeCounts>) {
        (self.failures, self.changes)
    }
}

/// How the writes of a run ended up in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// No transaction; every successful write stands.
    BestEffort,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// `None` when the run was rolled back and nothing it wrote survives.
    pub company_id: Option<RowId>,
    pub org_key: Option<Uuid>,
    /// Persisted unit id per client-side unit identifier.
    pub unit_ids: BTreeMap<String, RowId>,
    pub collaborator_ids: BTreeMap<String, RowId>,
    pub sector_ids: BTreeMap<String, RowId>,
    pub role_ids: BTreeMap<String, RowId>,
    pub created_references: Vec<(EntityKind, RowId)>,
    pub changes: BTreeMap<EntityKind, ChangeCounts>,
    pub failures: Vec<Failure>,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReconcileReport {
    /// Forget every id and change count of a rolled-back run; only the
    /// failures that caused the rollback remain.
    pub fn discard_writes(&mut self) {
        self.company_id = None;
        self.org_key = None;
        self.unit_ids.clear();
        self.collaborator_ids.clear();
        self.sector_ids.clear();
        self.role_ids.clear();
        self.created_references.clear();
        self.changes.clear();
    }

    pub fn has_errors(&self) -> bool {
        self.failures.iter().any(|f| !f.is_warning())
    }

    pub fn failures_for(&self, entity: EntityKind) -> impl Iterator<Item = &Failure> {
        self.failures.iter().filter(move |f| f.entity == entity)
    }

    pub fn changes_for(&self, entity: EntityKind) -> ChangeCounts {
        self.changes.get(&entity).copied().unwrap_or_default()
    }
}

/// Steps of a full company delete, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStep {
    ResolveUnits,
    Forms,
    Collaborators,
    Units,
    Company,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: CascadeStep,
    pub affected: u64,
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub company_id: RowId,
    pub deleted: bool,
    pub steps: Vec<StepOutcome>,
    pub failures: Vec<Failure>,
    pub outcome: Outcome,
}

impl DeleteReport {
    pub fn step(&self, step: CascadeStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step == step)
    }
}
