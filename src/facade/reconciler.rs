// ============================================================================
// Reconciler: company-level save and delete
// ============================================================================

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

use super::transactions::TransactionGuard;
use crate::config::ReconcileConfig;
use crate::core::{Collection, Fields, RowId, SyncError, SyncResult, Value};
use crate::identity::{Identity, IdentityClassifier};
use crate::model::{CompanyInput, OrganizationTree};
use crate::report::{DeleteReport, EntityKind, Failure, Outcome, ReconcileReport, RunLog};
use crate::storage::{EntityStore, Filter, TimeoutStore};
use crate::sync::{CascadePlanner, CollaboratorSynchronizer, ReferenceMaps, ReferenceResolver, UnitSynchronizer};

const COMPANY_COLUMNS: [&str; 6] = ["id", "owner_id", "org_key", "name", "sector_ids", "role_ids"];

/// Entry point for reconciling organization trees against a store.
///
/// # Examples
///
/// ```
/// use orgsync::{CompanyInput, InMemoryStore, OrganizationTree, Reconciler, UnitInput};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let reconciler = Reconciler::new(InMemoryStore::new());
/// let tree = OrganizationTree {
///     company: CompanyInput::new("user-1", "Acme").with_sector("Ops"),
///     units: vec![UnitInput::new("tmp-1", "HQ").with_sector("Ops")],
///     collaborators: Vec::new(),
/// };
///
/// let report = reconciler.reconcile(&tree).await?;
/// assert!(report.failures.is_empty());
/// assert!(report.unit_ids.contains_key("tmp-1"));
/// # Ok(())
/// # }
/// ```
pub struct Reconciler<S> {
    store: TimeoutStore<S>,
    config: ReconcileConfig,
    classifier: IdentityClassifier,
}

impl<S: EntityStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        let config = ReconcileConfig::default();
        Self {
            store: TimeoutStore::with_deadline(store, config.store_timeout),
            classifier: IdentityClassifier::new(config.placeholder_threshold),
            config,
        }
    }

    /// Every store call made by this reconciler is bounded by
    /// `config.store_timeout` when one is set.
    pub fn with_config(store: S, config: ReconcileConfig) -> SyncResult<Self> {
        config.validate().map_err(SyncError::Config)?;
        Ok(Self {
            store: TimeoutStore::with_deadline(store, config.store_timeout),
            classifier: IdentityClassifier::new(config.placeholder_threshold),
            config,
        })
    }

    pub fn store(&self) -> &S {
        self.store.inner()
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Save a whole organization tree.
    ///
    /// Only a failed company upsert (or transaction control) is an `Err`;
    /// every other problem ends up in [`ReconcileReport::failures`].
    pub async fn reconcile(&self, tree: &OrganizationTree) -> SyncResult<ReconcileReport> {
        let label = tree
            .company
            .id
            .as_ref()
            .map(|id| id.key())
            .unwrap_or_else(|| "new".to_string());
        let span = info_span!(
            "reconcile",
            company = %label,
            units = tree.units.len(),
            collaborators = tree.collaborators.len()
        );
        self.run_reconcile(tree).instrument(span).await
    }

    async fn run_reconcile(&self, tree: &OrganizationTree) -> SyncResult<ReconcileReport> {
        let started_at = Utc::now();
        let company = &tree.company;
        if company.name.trim().is_empty() {
            return Err(SyncError::InvalidInput("company name is required".into()));
        }
        if company.owner_id.trim().is_empty() {
            return Err(SyncError::InvalidInput("company owner is required".into()));
        }

        let guard = TransactionGuard::begin(&self.store, self.config.transaction_mode).await?;

        let (company_id, org_key) = match self.upsert_company(company).await {
            Ok(saved) => saved,
            Err(err) => {
                event!(Level::ERROR, error = %err, "company upsert failed, run aborted");
                guard.abort().await;
                return Err(err);
            }
        };

        let mut log = RunLog::new();
        let fan_out = self.config.fan_out;

        let refs = ReferenceResolver::new(&self.store, self.classifier, fan_out)
            .resolve(&company.sectors, &company.roles, &mut log)
            .await;
        self.link_references(&company_id, &refs, &mut log).await;

        let unit_ids = UnitSynchronizer::new(&self.store, self.classifier, fan_out)
            .sync(&org_key, &tree.units, &refs, &mut log)
            .await;

        let collaborator_ids = CollaboratorSynchronizer::new(&self.store, self.classifier, fan_out)
            .sync(&org_key.to_string(), &tree.collaborators, &unit_ids, &refs, &mut log)
            .await;

        let keep = self.config.transaction_mode.keeps_partial_results() || !log.has_errors();
        let outcome = guard.finish(keep).await?;
        let (failures, changes) = log.into_parts();

        event!(
            Level::INFO,
            company_id = %company_id,
            org_key = %org_key,
            failures = failures.len(),
            outcome = ?outcome,
            "reconciliation finished"
        );

        let mut report = ReconcileReport {
            company_id: Some(company_id),
            org_key: Some(org_key),
            unit_ids: unit_ids.into_iter().collect(),
            collaborator_ids: collaborator_ids.into_iter().collect(),
            sector_ids: refs.sectors.into_iter().collect(),
            role_ids: refs.roles.into_iter().collect(),
            created_references: refs.created,
            changes,
            failures,
            outcome,
            started_at,
            finished_at: Utc::now(),
        };
        if outcome == Outcome::RolledBack {
            report.discard_writes();
        }
        Ok(report)
    }

    /// Delete a company and all of its units, collaborators and forms.
    pub async fn cascade_delete(&self, company_id: &RowId) -> SyncResult<DeleteReport> {
        let span = info_span!("cascade_delete", company_id = %company_id);
        self.run_delete(company_id, None).instrument(span).await
    }

    /// Like [`cascade_delete`](Self::cascade_delete), restricted to companies
    /// owned by `owner_id`.
    pub async fn cascade_delete_owned(&self, company_id: &RowId, owner_id: &str) -> SyncResult<DeleteReport> {
        let span = info_span!("cascade_delete", company_id = %company_id, owner = owner_id);
        self.run_delete(company_id, Some(owner_id)).instrument(span).await
    }

    async fn run_delete(&self, company_id: &RowId, owner: Option<&str>) -> SyncResult<DeleteReport> {
        let guard = TransactionGuard::begin(&self.store, self.config.transaction_mode).await?;

        let mut log = RunLog::new();
        let (deleted, steps) = CascadePlanner::new(&self.store)
            .delete_company(company_id, owner, &mut log)
            .await;

        let keep = deleted && (self.config.transaction_mode.keeps_partial_results() || !log.has_errors());
        let outcome = guard.finish(keep).await?;
        let (failures, _) = log.into_parts();

        Ok(DeleteReport {
            company_id: company_id.clone(),
            deleted: deleted && outcome != Outcome::RolledBack,
            steps,
            failures,
            outcome,
        })
    }

    // ========================================================================
    // Company row
    // ========================================================================

    async fn upsert_company(&self, company: &CompanyInput) -> SyncResult<(RowId, Uuid)> {
        let mut fields = company_fields(company);

        match self.classifier.classify_opt(company.id.as_ref()) {
            Identity::Persisted(id) => {
                let scope = Filter::by_id(&id).eq("owner_id", company.owner_id.as_str());
                let row = self
                    .store
                    .find_one(Collection::Companies, &scope)
                    .await
                    .map_err(SyncError::FatalStore)?
                    .ok_or_else(|| SyncError::CompanyNotFound(id.clone()))?;

                let org_key = match row.text("org_key").and_then(|k| k.parse::<Uuid>().ok()) {
                    Some(key) => key,
                    None => {
                        let key = Uuid::new_v4();
                        event!(Level::WARN, company_id = %id, org_key = %key, "company had no org key, assigning one");
                        fields.insert("org_key".into(), Value::from(key.to_string()));
                        key
                    }
                };

                self.store
                    .update(Collection::Companies, &id, fields)
                    .await
                    .map_err(SyncError::FatalStore)?;
                event!(Level::DEBUG, company_id = %id, "company updated");
                Ok((id, org_key))
            }
            Identity::Pending(_) => {
                let org_key = Uuid::new_v4();
                fields.insert("owner_id".into(), Value::from(company.owner_id.as_str()));
                fields.insert("org_key".into(), Value::from(org_key.to_string()));
                fields.insert("sector_ids".into(), Value::IdSet(Vec::new()));
                fields.insert("role_ids".into(), Value::IdSet(Vec::new()));

                let row = self
                    .store
                    .insert(Collection::Companies, fields)
                    .await
                    .map_err(SyncError::FatalStore)?;
                event!(Level::DEBUG, company_id = %row.id, org_key = %org_key, "company created");
                Ok((row.id, org_key))
            }
        }
    }

    /// Point the company row at the resolved sectors and roles.
    async fn link_references(&self, company_id: &RowId, refs: &ReferenceMaps, log: &mut RunLog) {
        let mut sector_ids: Vec<RowId> = refs.sectors.values().cloned().collect();
        let mut role_ids: Vec<RowId> = refs.roles.values().cloned().collect();
        sector_ids.sort();
        sector_ids.dedup();
        role_ids.sort();
        role_ids.dedup();

        let mut fields = Fields::new();
        fields.insert("sector_ids".into(), Value::IdSet(sector_ids));
        fields.insert("role_ids".into(), Value::IdSet(role_ids));

        if let Err(err) = self.store.update(Collection::Companies, company_id, fields).await {
            log.fail(Failure::partial(
                EntityKind::Company,
                company_id.to_string(),
                format!("linking sectors and roles failed: {}", err),
            ));
        }
    }
}

fn company_fields(company: &CompanyInput) -> Fields {
    let mut fields: Fields = company
        .details
        .iter()
        .filter(|(key, _)| !COMPANY_COLUMNS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), Value::optional_text(value)))
        .collect::<BTreeMap<_, _>>();
    fields.insert("name".into(), Value::from(company.name.trim()));
    fields
}
