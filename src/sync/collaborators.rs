//! Collaborator reconciliation.
//!
//! A collaborator is only written when its unit resolves to a row of the
//! same organization; anything else is reported and skipped so no
//! collaborator is ever left pointing at a unit outside its company.

use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{Level, event};

use super::reference::ReferenceMaps;
use super::units::UnitIdMap;
use crate::core::{Collection, Fields, RowId, Value};
use crate::identity::{Identity, IdentityClassifier};
use crate::model::CollaboratorInput;
use crate::report::{EntityKind, Failure, RunLog};
use crate::storage::{EntityStore, Filter};

const RESERVED_COLUMNS: [&str; 5] = ["id", "unit_id", "name", "sector_id", "role_id"];

/// Persisted collaborator id per collaborator label.
pub type CollaboratorIdMap = HashMap<String, RowId>;

pub struct CollaboratorSynchronizer<'a, S: ?Sized> {
    store: &'a S,
    classifier: IdentityClassifier,
    fan_out: usize,
}

impl<'a, S: EntityStore + ?Sized> CollaboratorSynchronizer<'a, S> {
    pub fn new(store: &'a S, classifier: IdentityClassifier, fan_out: usize) -> Self {
        Self {
            store,
            classifier,
            fan_out: fan_out.max(1),
        }
    }

    pub async fn sync(
        &self,
        org_key: &str,
        collaborators: &[CollaboratorInput],
        unit_ids: &UnitIdMap,
        refs: &ReferenceMaps,
        log: &mut RunLog,
    ) -> CollaboratorIdMap {
        let mut ids = CollaboratorIdMap::new();

        let org_units: HashSet<RowId> = match self
            .store
            .find_many(Collection::Units, &Filter::new().eq("org_key", org_key))
            .await
        {
            Ok(rows) => rows.into_iter().map(|r| r.id).collect(),
            Err(err) => {
                log.fail(Failure::partial(
                    EntityKind::Collaborator,
                    org_key,
                    format!("listing units failed, collaborator stage skipped: {}", err),
                ));
                return ids;
            }
        };

        let persisted: HashSet<RowId> = if org_units.is_empty() {
            HashSet::new()
        } else {
            let filter = Filter::new().is_in("unit_id", org_units.iter().cloned());
            match self.store.find_many(Collection::Collaborators, &filter).await {
                Ok(rows) => rows.into_iter().map(|r| r.id).collect(),
                Err(err) => {
                    log.fail(Failure::partial(
                        EntityKind::Collaborator,
                        org_key,
                        format!("listing collaborators failed, collaborator stage skipped: {}", err),
                    ));
                    return ids;
                }
            }
        };

        let incoming: HashSet<RowId> = collaborators
            .iter()
            .filter_map(|c| self.classifier.classify_opt(c.id.as_ref()).persisted().cloned())
            .collect();

        let doomed: BTreeSet<&RowId> = persisted.difference(&incoming).collect();
        for id in doomed {
            match self.store.delete(Collection::Collaborators, &Filter::by_id(id)).await {
                Ok(0) => log.fail(Failure::cascade(
                    EntityKind::Collaborator,
                    id.to_string(),
                    "collaborator row was not found",
                )),
                Ok(count) => log.deleted(EntityKind::Collaborator, count),
                Err(err) => log.fail(Failure::partial(EntityKind::Collaborator, id.to_string(), err)),
            }
        }

        let mut seen = HashSet::new();
        let mut planned = Vec::new();
        for collaborator in collaborators {
            let label = collaborator.label();
            if !seen.insert(label.clone()) {
                log.fail(Failure::partial(EntityKind::Collaborator, &label, "duplicate collaborator identifier"));
                continue;
            }
            if collaborator.name.trim().is_empty() {
                log.fail(Failure::partial(EntityKind::Collaborator, &label, "collaborator name is required"));
                continue;
            }

            let identity = self.classifier.classify_opt(collaborator.id.as_ref());
            if let Identity::Persisted(id) = &identity
                && !persisted.contains(id)
            {
                log.fail(Failure::partial(
                    EntityKind::Collaborator,
                    &label,
                    format!("collaborator {} does not belong to organization {}", id, org_key),
                ));
                continue;
            }

            let Some(unit_id) = self.resolve_unit(collaborator, unit_ids, &org_units) else {
                log.fail(Failure::partial(
                    EntityKind::Collaborator,
                    &label,
                    format!("unit '{}' is not part of this organization", collaborator.unit_id.key()),
                ));
                continue;
            };

            let fields = collaborator_fields(collaborator, unit_id, &label, refs, log);
            planned.push((label, identity, fields));
        }

        let results: Vec<_> = stream::iter(planned)
            .map(|(label, identity, fields)| async move {
                let result = match identity {
                    Identity::Persisted(id) => self
                        .store
                        .update(Collection::Collaborators, &id, fields)
                        .await
                        .map(|_| (false, id)),
                    Identity::Pending(_) => self
                        .store
                        .insert(Collection::Collaborators, fields)
                        .await
                        .map(|row| (true, row.id)),
                };
                (label, result)
            })
            .buffered(self.fan_out)
            .collect()
            .await;

        for (label, result) in results {
            match result {
                Ok((inserted, id)) => {
                    if inserted {
                        log.inserted(EntityKind::Collaborator);
                    } else {
                        log.updated(EntityKind::Collaborator);
                    }
                    ids.insert(label, id);
                }
                Err(err) => log.fail(Failure::partial(EntityKind::Collaborator, &label, err)),
            }
        }

        event!(Level::DEBUG, org_key, collaborators = ids.len(), "collaborators synchronized");
        ids
    }

    /// Unit of this save first, then an already persisted unit of the
    /// same organization.
    fn resolve_unit(
        &self,
        collaborator: &CollaboratorInput,
        unit_ids: &UnitIdMap,
        org_units: &HashSet<RowId>,
    ) -> Option<RowId> {
        if let Some(id) = unit_ids.get(&collaborator.unit_id.key()) {
            return Some(id.clone());
        }
        self.classifier
            .classify(&collaborator.unit_id)
            .persisted()
            .filter(|id| org_units.contains(*id))
            .cloned()
    }
}

fn collaborator_fields(
    collaborator: &CollaboratorInput,
    unit_id: RowId,
    label: &str,
    refs: &ReferenceMaps,
    log: &mut RunLog,
) -> Fields {
    let sector = collaborator.sector.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let role = collaborator.role.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let sector_id = sector.and_then(|name| {
        let id = refs.sector_id(name).cloned();
        if id.is_none() {
            log.fail(Failure::unresolved(
                EntityKind::Collaborator,
                label,
                format!("sector '{}' is not resolved", name),
            ));
        }
        id
    });

    let role_id = match (role, sector) {
        (Some(role), Some(sector)) => {
            let id = refs.role_id(sector, role).cloned();
            if id.is_none() {
                log.fail(Failure::unresolved(
                    EntityKind::Collaborator,
                    label,
                    format!("role '{}/{}' is not resolved", sector, role),
                ));
            }
            id
        }
        (Some(role), None) => {
            log.fail(Failure::unresolved(
                EntityKind::Collaborator,
                label,
                format!("role '{}' has no sector", role),
            ));
            None
        }
        (None, _) => None,
    };

    let mut fields = Fields::new();
    fields.insert("unit_id".into(), Value::Id(unit_id));
    fields.insert("name".into(), Value::from(collaborator.name.trim()));
    fields.insert("sector_id".into(), Value::from(sector_id));
    fields.insert("role_id".into(), Value::from(role_id));
    for (key, value) in &collaborator.details {
        if RESERVED_COLUMNS.contains(&key.as_str()) {
            continue;
        }
        fields.insert(key.clone(), Value::optional_text(value));
    }
    fields
}
