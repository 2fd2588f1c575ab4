// ============================================================================
// Reference Resolution
// ============================================================================
//
// Sectors and roles are shared across companies and deduplicated by natural
// key: sector name, and (role name, sector id) for roles. Each incoming
// entry is looked up first and only inserted when absent, so running the
// resolver twice with the same input creates nothing the second time.
//
// ============================================================================

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use tracing::{Level, event};

use crate::core::{Collection, Fields, Result, RowId, Value};
use crate::identity::{ClientId, IdentityClassifier};
use crate::model::{RoleInput, SectorInput, role_key};
use crate::report::{EntityKind, Failure, RunLog};
use crate::storage::{EntityStore, Filter};

/// Name-to-id maps produced by one resolution pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceMaps {
    /// Sector name -> sector id
    pub sectors: HashMap<String, RowId>,
    /// `"<sector>/<role>"` -> role id
    pub roles: HashMap<String, RowId>,
    /// Rows inserted by this pass
    pub created: Vec<(EntityKind, RowId)>,
}

/// Names are matched with surrounding whitespace removed, the same way the
/// resolver stores them.
impl ReferenceMaps {
    pub fn sector_id(&self, name: &str) -> Option<&RowId> {
        self.sectors.get(name.trim())
    }

    pub fn role_id(&self, sector: &str, role: &str) -> Option<&RowId> {
        self.roles.get(&role_key(sector.trim(), role.trim()))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Resolution {
    Found(RowId),
    Created(RowId),
    Renamed(RowId),
}

impl Resolution {
    fn id(&self) -> &RowId {
        match self {
            Resolution::Found(id) | Resolution::Created(id) | Resolution::Renamed(id) => id,
        }
    }
}

pub struct ReferenceResolver<'a, S: ?Sized> {
    store: &'a S,
    classifier: IdentityClassifier,
    fan_out: usize,
}

impl<'a, S: EntityStore + ?Sized> ReferenceResolver<'a, S> {
    pub fn new(store: &'a S, classifier: IdentityClassifier, fan_out: usize) -> Self {
        Self {
            store,
            classifier,
            fan_out: fan_out.max(1),
        }
    }

    /// Resolve every sector, then every role, into id maps.
    ///
    /// Individual failures are recorded in `log` and leave the name out of
    /// the maps; nothing here aborts the run.
    pub async fn resolve(
        &self,
        sectors: &[SectorInput],
        roles: &[RoleInput],
        log: &mut RunLog,
    ) -> ReferenceMaps {
        let sectors: Vec<SectorInput> = sectors.iter().map(SectorInput::trimmed).collect();
        let roles: Vec<RoleInput> = roles.iter().map(RoleInput::trimmed).collect();

        let mut maps = ReferenceMaps::default();
        self.resolve_sectors(&sectors, &mut maps, log).await;
        self.resolve_roles(&roles, &mut maps, log).await;

        event!(
            Level::DEBUG,
            sectors = maps.sectors.len(),
            roles = maps.roles.len(),
            created = maps.created.len(),
            "references resolved"
        );
        maps
    }

    async fn resolve_sectors(&self, sectors: &[SectorInput], maps: &mut ReferenceMaps, log: &mut RunLog) {
        let named = sectors.iter().filter(|s| !s.name.is_empty());
        let unique = dedup_by(named, |s: &SectorInput| s.name.clone());

        // Renames go first so a plain lookup never sees a half-renamed row.
        let (tracked, untracked): (Vec<&SectorInput>, Vec<&SectorInput>) = unique
            .into_iter()
            .partition(|s| self.persisted_id(s.id.as_ref()).is_some());

        for batch in [tracked, untracked] {
            let results: Vec<_> = stream::iter(batch)
                .map(|entry| async move { (entry, self.resolve_sector(entry).await) })
                .buffered(self.fan_out)
                .collect()
                .await;

            for (entry, result) in results {
                match result {
                    Ok(resolution) => {
                        record(EntityKind::Sector, &resolution, maps, log);
                        maps.sectors.insert(entry.name.clone(), resolution.id().clone());
                    }
                    Err(err) => log.fail(Failure::partial(EntityKind::Sector, &entry.name, err)),
                }
            }
        }
    }

    async fn resolve_roles(&self, roles: &[RoleInput], maps: &mut ReferenceMaps, log: &mut RunLog) {
        let mut pending = Vec::new();
        let named = roles
            .iter()
            .filter(|r| !r.name.is_empty() && !r.sector.is_empty());
        for role in dedup_by(named, RoleInput::key) {
            match maps.sectors.get(&role.sector) {
                Some(sector_id) => pending.push((role, sector_id.clone())),
                None => log.fail(Failure::unresolved(
                    EntityKind::Role,
                    role.key(),
                    format!("sector '{}' is not resolved", role.sector),
                )),
            }
        }

        let (tracked, untracked): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|(r, _)| self.persisted_id(r.id.as_ref()).is_some());

        for batch in [tracked, untracked] {
            let results: Vec<_> = stream::iter(batch)
                .map(|(role, sector_id)| async move {
                    let result = self.resolve_role(role, &sector_id).await;
                    (role, result)
                })
                .buffered(self.fan_out)
                .collect()
                .await;

            for (role, result) in results {
                match result {
                    Ok(resolution) => {
                        record(EntityKind::Role, &resolution, maps, log);
                        maps.roles.insert(role.key(), resolution.id().clone());
                    }
                    Err(err) => log.fail(Failure::partial(EntityKind::Role, role.key(), err)),
                }
            }
        }
    }

    async fn resolve_sector(&self, entry: &SectorInput) -> Result<Resolution> {
        let by_name = Filter::new().eq("name", entry.name.as_str());

        if let Some(id) = self.persisted_id(entry.id.as_ref())
            && let Some(row) = self.store.find_one(Collection::Sectors, &Filter::by_id(&id)).await?
        {
            if row.text("name") == Some(entry.name.as_str()) {
                return Ok(Resolution::Found(row.id));
            }
            if let Some(owner) = self.store.find_one(Collection::Sectors, &by_name).await? {
                return Ok(Resolution::Found(owner.id));
            }
            self.store
                .update(Collection::Sectors, &row.id, name_fields(&entry.name))
                .await?;
            return Ok(Resolution::Renamed(row.id));
        }

        if let Some(row) = self.store.find_one(Collection::Sectors, &by_name).await? {
            return Ok(Resolution::Found(row.id));
        }
        let row = self
            .store
            .insert(Collection::Sectors, name_fields(&entry.name))
            .await?;
        Ok(Resolution::Created(row.id))
    }

    async fn resolve_role(&self, role: &RoleInput, sector_id: &RowId) -> Result<Resolution> {
        let by_key = Filter::new()
            .eq("name", role.name.as_str())
            .eq("sector_id", sector_id);

        let mut fields = name_fields(&role.name);
        fields.insert("sector_id".into(), Value::from(sector_id));

        if let Some(id) = self.persisted_id(role.id.as_ref())
            && let Some(row) = self.store.find_one(Collection::Roles, &Filter::by_id(&id)).await?
        {
            let same_sector = row.get("sector_id").as_ref().and_then(Value::as_id) == Some(sector_id);
            if same_sector && row.text("name") == Some(role.name.as_str()) {
                return Ok(Resolution::Found(row.id));
            }
            if let Some(owner) = self.store.find_one(Collection::Roles, &by_key).await? {
                return Ok(Resolution::Found(owner.id));
            }
            self.store.update(Collection::Roles, &row.id, fields).await?;
            return Ok(Resolution::Renamed(row.id));
        }

        if let Some(row) = self.store.find_one(Collection::Roles, &by_key).await? {
            return Ok(Resolution::Found(row.id));
        }
        let row = self.store.insert(Collection::Roles, fields).await?;
        Ok(Resolution::Created(row.id))
    }

    fn persisted_id(&self, id: Option<&ClientId>) -> Option<RowId> {
        id.and_then(|id| self.classifier.classify(id).persisted().cloned())
    }
}

fn record(entity: EntityKind, resolution: &Resolution, maps: &mut ReferenceMaps, log: &mut RunLog) {
    match resolution {
        Resolution::Created(id) => {
            log.inserted(entity);
            maps.created.push((entity, id.clone()));
        }
        Resolution::Renamed(_) => log.updated(entity),
        Resolution::Found(_) => {}
    }
}

fn name_fields(name: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("name".into(), Value::from(name));
    fields
}

/// First occurrence per key, in input order.
fn dedup_by<'t, T: 't, I, F>(items: I, key: F) -> Vec<&'t T>
where
    I: IntoIterator<Item = &'t T>,
    F: Fn(&T) -> String,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(*item))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn resolver(store: &InMemoryStore) -> ReferenceResolver<'_, InMemoryStore> {
        ReferenceResolver::new(store, IdentityClassifier::default(), 4)
    }

    #[tokio::test]
    async fn test_duplicate_names_resolve_to_one_row() {
        let store = InMemoryStore::new();
        let mut log = RunLog::new();
        let sectors = vec![
            SectorInput::named("Ops"),
            SectorInput::named("Ops"),
            SectorInput::named(""),
        ];

        let maps = resolver(&store).resolve(&sectors, &[], &mut log).await;

        assert_eq!(maps.sectors.len(), 1);
        assert_eq!(store.count(Collection::Sectors).await, 1);
        assert!(log.failures().is_empty());
    }

    #[tokio::test]
    async fn test_names_are_matched_without_surrounding_whitespace() {
        let store = InMemoryStore::new();
        let mut log = RunLog::new();
        let sectors = vec![SectorInput::named(" Ops "), SectorInput::named("Ops")];
        let roles = vec![RoleInput::new("Lead ", "Ops"), RoleInput::new("Lead", " Ops")];

        let maps = resolver(&store).resolve(&sectors, &roles, &mut log).await;

        assert!(log.failures().is_empty());
        assert_eq!(maps.sectors.len(), 1);
        assert_eq!(maps.roles.len(), 1);
        assert_eq!(maps.sector_id("Ops"), maps.sector_id("  Ops"));
        assert!(maps.role_id(" Ops", "Lead ").is_some());

        let rows = store.find_many(Collection::Sectors, &Filter::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("name"), Some("Ops"));
    }

    #[tokio::test]
    async fn test_role_with_unknown_sector_is_skipped() {
        let store = InMemoryStore::new();
        let mut log = RunLog::new();
        let sectors = vec![SectorInput::named("Ops")];
        let roles = vec![RoleInput::new("Lead", "Ops"), RoleInput::new("Clerk", "Finance")];

        let maps = resolver(&store).resolve(&sectors, &roles, &mut log).await;

        assert!(maps.role_id("Ops", "Lead").is_some());
        assert!(maps.role_id("Finance", "Clerk").is_none());
        assert_eq!(log.failures().len(), 1);
        assert!(log.failures()[0].is_warning());
    }

    #[tokio::test]
    async fn test_same_role_name_in_two_sectors() {
        let store = InMemoryStore::new();
        let mut log = RunLog::new();
        let sectors = vec![SectorInput::named("Ops"), SectorInput::named("HR")];
        let roles = vec![RoleInput::new("Lead", "Ops"), RoleInput::new("Lead", "HR")];

        let maps = resolver(&store).resolve(&sectors, &roles, &mut log).await;

        assert_ne!(maps.role_id("Ops", "Lead"), maps.role_id("HR", "Lead"));
        assert_eq!(store.count(Collection::Roles).await, 2);
        assert_eq!(maps.created.len(), 4);
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let items = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        let unique = dedup_by(&items, |s: &String| s.clone());
        assert_eq!(unique, vec![&"b".to_string(), &"a".to_string()]);
    }
}
