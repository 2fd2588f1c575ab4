// ============================================================================
// Unit Synchronization
// ============================================================================
//
// Deletion pass first: every persisted unit of the company that the
// incoming tree no longer names is removed through the cascade planner.
// Then each incoming unit is inserted or updated, with its sector and role
// names translated through the reference maps.
//
// ============================================================================

use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{Level, event};
use uuid::Uuid;

use super::cascade::CascadePlanner;
use super::reference::ReferenceMaps;
use crate::core::{Collection, Fields, RowId, Value};
use crate::identity::{Identity, IdentityClassifier};
use crate::model::UnitInput;
use crate::report::{EntityKind, Failure, RunLog};
use crate::storage::{EntityStore, Filter};

/// Persisted unit id per client-side unit key.
pub type UnitIdMap = HashMap<String, RowId>;

enum Write {
    Inserted(RowId),
    Updated(RowId),
}

pub struct UnitSynchronizer<'a, S: ?Sized> {
    store: &'a S,
    classifier: IdentityClassifier,
    fan_out: usize,
}

impl<'a, S: EntityStore + ?Sized> UnitSynchronizer<'a, S> {
    pub fn new(store: &'a S, classifier: IdentityClassifier, fan_out: usize) -> Self {
        Self {
            store,
            classifier,
            fan_out: fan_out.max(1),
        }
    }

    pub async fn sync(
        &self,
        org_key: &Uuid,
        units: &[UnitInput],
        refs: &ReferenceMaps,
        log: &mut RunLog,
    ) -> UnitIdMap {
        let org = org_key.to_string();
        let mut unit_ids = UnitIdMap::new();

        let persisted: HashSet<RowId> = match self
            .store
            .find_many(Collection::Units, &Filter::new().eq("org_key", org.as_str()))
            .await
        {
            Ok(rows) => rows.into_iter().map(|r| r.id).collect(),
            Err(err) => {
                log.fail(Failure::partial(
                    EntityKind::Unit,
                    &org,
                    format!("listing units failed, unit stage skipped: {}", err),
                ));
                return unit_ids;
            }
        };

        let incoming: HashSet<RowId> = units
            .iter()
            .filter_map(|u| self.classifier.classify(&u.id).persisted().cloned())
            .collect();

        let planner = CascadePlanner::new(self.store);
        let doomed: BTreeSet<&RowId> = persisted.difference(&incoming).collect();
        for unit_id in doomed {
            planner.delete_unit(unit_id, log).await;
        }

        let mut seen = HashSet::new();
        let mut planned = Vec::new();
        for unit in units {
            let key = unit.id.key();
            if !seen.insert(key.clone()) {
                log.fail(Failure::partial(EntityKind::Unit, &key, "duplicate unit identifier"));
                continue;
            }
            if unit.name.trim().is_empty() {
                log.fail(Failure::partial(EntityKind::Unit, &key, "unit name is required"));
                continue;
            }

            let identity = self.classifier.classify(&unit.id);
            if let Identity::Persisted(id) = &identity
                && !persisted.contains(id)
            {
                log.fail(Failure::partial(
                    EntityKind::Unit,
                    &key,
                    format!("unit {} does not belong to organization {}", id, org),
                ));
                continue;
            }

            let fields = unit_fields(unit, &key, refs, log);
            planned.push((key, identity, fields));
        }

        let results: Vec<_> = stream::iter(planned)
            .map(|(key, identity, fields)| {
                let org = org.as_str();
                async move {
                    let result = match identity {
                        Identity::Persisted(id) => self
                            .store
                            .update(Collection::Units, &id, fields)
                            .await
                            .map(|_| Write::Updated(id)),
                        Identity::Pending(_) => {
                            let mut fields = fields;
                            fields.insert("org_key".into(), Value::from(org));
                            self.store
                                .insert(Collection::Units, fields)
                                .await
                                .map(|row| Write::Inserted(row.id))
                        }
                    };
                    (key, result)
                }
            })
            .buffered(self.fan_out)
            .collect()
            .await;

        for (key, result) in results {
            match result {
                Ok(Write::Inserted(id)) => {
                    log.inserted(EntityKind::Unit);
                    unit_ids.insert(key, id);
                }
                Ok(Write::Updated(id)) => {
                    log.updated(EntityKind::Unit);
                    unit_ids.insert(key, id);
                }
                Err(err) => log.fail(Failure::partial(EntityKind::Unit, &key, err)),
            }
        }

        event!(Level::DEBUG, org_key = %org_key, units = unit_ids.len(), "units synchronized");
        unit_ids
    }
}

/// Name, sector ids and role ids of a unit; unresolved names are dropped.
fn unit_fields(unit: &UnitInput, key: &str, refs: &ReferenceMaps, log: &mut RunLog) -> Fields {
    let mut sector_ids = Vec::new();
    for name in &unit.sectors {
        match refs.sector_id(name) {
            Some(id) if !sector_ids.contains(id) => sector_ids.push(id.clone()),
            Some(_) => {}
            None => log.fail(Failure::unresolved(
                EntityKind::Unit,
                key,
                format!("sector '{}' is not resolved", name),
            )),
        }
    }

    let mut role_ids = Vec::new();
    for role in &unit.roles {
        match refs.role_id(&role.sector, &role.name) {
            Some(id) if !role_ids.contains(id) => role_ids.push(id.clone()),
            Some(_) => {}
            None => log.fail(Failure::unresolved(
                EntityKind::Unit,
                key,
                format!("role '{}' is not resolved", role.key()),
            )),
        }
    }

    let mut fields = Fields::new();
    fields.insert("name".into(), Value::from(unit.name.as_str()));
    fields.insert("sector_ids".into(), Value::IdSet(sector_ids));
    fields.insert("role_ids".into(), Value::IdSet(role_ids));
    fields
}
