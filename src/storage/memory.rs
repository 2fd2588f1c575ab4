use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{Level, event};

use super::persistence::StoreSnapshot;
use super::schema::{ForeignKey, ORGANIZATION_FOREIGN_KEYS};
use super::{EntityStore, Filter};
use crate::core::{Collection, Fields, Record, Result, RowId, StoreError, Value};

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: BTreeMap<Collection, BTreeMap<RowId, Fields>>,
    next_ids: BTreeMap<Collection, i64>,
}

impl Tables {
    fn records(&self, collection: Collection) -> impl Iterator<Item = Record> + '_ {
        self.rows
            .get(&collection)
            .into_iter()
            .flat_map(|table| table.iter())
            .map(|(id, fields)| Record::new(id.clone(), fields.clone()))
    }

    fn scan(&self, collection: Collection, filter: &Filter) -> Vec<Record> {
        self.records(collection).filter(|r| filter.matches(r)).collect()
    }

    fn contains(&self, collection: Collection, id: &RowId) -> bool {
        self.rows
            .get(&collection)
            .is_some_and(|table| table.contains_key(id))
    }

    fn allocate_id(&mut self, collection: Collection) -> RowId {
        let next = self.next_ids.entry(collection).or_insert(1);
        let id = *next;
        *next += 1;
        RowId::Seq(id)
    }

    /// Every non-null foreign key in `fields` must point at an existing row.
    fn check_references(
        &self,
        foreign_keys: &[ForeignKey],
        collection: Collection,
        fields: &Fields,
    ) -> Result<()> {
        for fk in foreign_keys.iter().filter(|fk| fk.collection == collection) {
            let Some(value) = fields.get(fk.column) else {
                continue;
            };
            if value.is_null() {
                continue;
            }

            let dangling = if fk.referenced_column == "id" {
                if !matches!(value, Value::Id(_) | Value::IdSet(_)) {
                    return Err(StoreError::ConstraintViolation(format!(
                        "Column '{}.{}' expects a row id, got {}",
                        collection,
                        fk.column,
                        value.type_name()
                    )));
                }
                value
                    .referenced_ids()
                    .into_iter()
                    .find(|id| !self.contains(fk.references, id))
                    .map(|id| Value::Id(id.clone()))
            } else {
                let found = self
                    .records(fk.references)
                    .any(|r| r.get(fk.referenced_column).as_ref() == Some(value));
                (!found).then(|| value.clone())
            };

            if let Some(missing) = dangling {
                return Err(StoreError::ConstraintViolation(format!(
                    "Foreign key violation: Value {} in '{}.{}' references non-existent key in '{}.{}'",
                    missing, collection, fk.column, fk.references, fk.referenced_column
                )));
            }
        }
        Ok(())
    }

    /// RESTRICT: `key_column` of `row` must not be referenced by any dependent row.
    fn check_not_referenced(
        &self,
        foreign_keys: &[ForeignKey],
        collection: Collection,
        row: &Record,
        key_column: Option<&str>,
    ) -> Result<()> {
        let relevant = foreign_keys.iter().filter(|fk| {
            fk.references == collection
                && key_column.is_none_or(|column| fk.referenced_column == column)
        });

        for fk in relevant {
            let Some(key) = row.get(fk.referenced_column) else {
                continue;
            };
            if key.is_null() {
                continue;
            }

            let dependent = self.records(fk.collection).find(|dep| {
                dep.fields
                    .get(fk.column)
                    .is_some_and(|value| value.contains(&key))
            });

            if let Some(dep) = dependent {
                return Err(StoreError::ConstraintViolation(format!(
                    "Delete from '{}' violates foreign key constraint: row {} is still referenced by '{}.{}' (row {})",
                    collection, row.id, fk.collection, fk.column, dep.id
                )));
            }
        }
        Ok(())
    }
}

/// Transaction opened by `begin`: the state to restore and the gate that
/// keeps other transactions waiting until this one ends.
struct OpenTransaction {
    saved: Tables,
    _gate: OwnedMutexGuard<()>,
}

/// Reference [`EntityStore`] held entirely in memory.
///
/// Enforces the organization foreign keys (dangling references are rejected
/// on write, referenced rows cannot be deleted) and supports snapshot-based
/// transactions. A second `begin` waits until the open transaction commits
/// or rolls back.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    gate: Arc<Mutex<()>>,
    open: Mutex<Option<OpenTransaction>>,
    foreign_keys: Vec<ForeignKey>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_foreign_keys(ORGANIZATION_FOREIGN_KEYS.to_vec())
    }

    /// A store that accepts any write, for tests that need to observe
    /// what an unconstrained backend would end up holding.
    pub fn unconstrained() -> Self {
        Self::with_foreign_keys(Vec::new())
    }

    pub fn with_foreign_keys(foreign_keys: Vec<ForeignKey>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            gate: Arc::new(Mutex::new(())),
            open: Mutex::new(None),
            foreign_keys,
        }
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut tables = Tables {
            rows: BTreeMap::new(),
            next_ids: snapshot.next_ids,
        };
        for (collection, records) in snapshot.tables {
            let table = tables.rows.entry(collection).or_default();
            for record in records {
                table.insert(record.id, record.fields);
            }
        }
        Self {
            tables: RwLock::new(tables),
            gate: Arc::new(Mutex::new(())),
            open: Mutex::new(None),
            foreign_keys: ORGANIZATION_FOREIGN_KEYS.to_vec(),
        }
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let tables = self.tables.read().await;
        let rows = Collection::ALL
            .iter()
            .map(|c| (*c, tables.records(*c).collect::<Vec<_>>()))
            .filter(|(_, records)| !records.is_empty())
            .collect();
        StoreSnapshot::new(rows, tables.next_ids.clone())
    }

    pub async fn count(&self, collection: Collection) -> usize {
        let tables = self.tables.read().await;
        tables.rows.get(&collection).map_or(0, BTreeMap::len)
    }

    pub async fn counts(&self) -> BTreeMap<Collection, usize> {
        let tables = self.tables.read().await;
        Collection::ALL
            .iter()
            .map(|c| (*c, tables.rows.get(c).map_or(0, BTreeMap::len)))
            .collect()
    }

    pub async fn in_transaction(&self) -> bool {
        self.open.lock().await.is_some()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Record>> {
        let tables = self.tables.read().await;
        Ok(tables.records(collection).find(|r| filter.matches(r)))
    }

    async fn find_many(&self, collection: Collection, filter: &Filter) -> Result<Vec<Record>> {
        let tables = self.tables.read().await;
        Ok(tables.scan(collection, filter))
    }

    async fn insert(&self, collection: Collection, mut fields: Fields) -> Result<Record> {
        let mut tables = self.tables.write().await;
        fields.remove("id");
        tables.check_references(&self.foreign_keys, collection, &fields)?;

        let id = tables.allocate_id(collection);
        tables
            .rows
            .entry(collection)
            .or_default()
            .insert(id.clone(), fields.clone());

        event!(Level::TRACE, %collection, %id, "row inserted");
        Ok(Record::new(id, fields))
    }

    async fn update(&self, collection: Collection, id: &RowId, mut fields: Fields) -> Result<()> {
        let mut tables = self.tables.write().await;
        fields.remove("id");

        let current = tables
            .rows
            .get(&collection)
            .and_then(|table| table.get(id))
            .cloned()
            .ok_or_else(|| StoreError::RowNotFound {
                collection,
                id: id.clone(),
            })?;

        // Key columns other rows point at may only change when nothing refers to them.
        let old = Record::new(id.clone(), current.clone());
        for (column, value) in &fields {
            if current.get(column) != Some(value) {
                tables.check_not_referenced(&self.foreign_keys, collection, &old, Some(column))?;
            }
        }

        let mut merged = current;
        merged.extend(fields);
        tables.check_references(&self.foreign_keys, collection, &merged)?;

        if let Some(table) = tables.rows.get_mut(&collection) {
            table.insert(id.clone(), merged);
        }
        event!(Level::TRACE, %collection, %id, "row updated");
        Ok(())
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let doomed = tables.scan(collection, filter);

        for row in &doomed {
            tables.check_not_referenced(&self.foreign_keys, collection, row, None)?;
        }

        if let Some(table) = tables.rows.get_mut(&collection) {
            for row in &doomed {
                table.remove(&row.id);
            }
        }
        event!(Level::TRACE, %collection, count = doomed.len(), "rows deleted");
        Ok(doomed.len() as u64)
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    async fn begin(&self) -> Result<()> {
        let gate = self.gate.clone().lock_owned().await;
        let saved = self.tables.read().await.clone();
        *self.open.lock().await = Some(OpenTransaction { saved, _gate: gate });
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.open
            .lock()
            .await
            .take()
            .map(|_| ())
            .ok_or_else(|| StoreError::Transaction("no active transaction".into()))
    }

    async fn rollback(&self) -> Result<()> {
        let open = self
            .open
            .lock()
            .await
            .take()
            .ok_or_else(|| StoreError::Transaction("no active transaction".into()))?;
        *self.tables.write().await = open.saved;
        Ok(())
    }
}
