#![allow(dead_code)]

use async_trait::async_trait;
use orgsync::{
    Collection, CompanyInput, EntityStore, Fields, Filter, InMemoryStore, OrganizationTree, Record,
    Result, RowId, StoreError, Value,
};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    FindOne,
    FindMany,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
struct Fault {
    op: Op,
    collection: Collection,
    when: Option<(String, Value)>,
    stall: Option<Duration>,
}

/// In-memory store that fails or stalls selected calls.
pub struct FaultInjectingStore {
    inner: InMemoryStore,
    faults: Mutex<Vec<Fault>>,
    transactional: bool,
}

impl FaultInjectingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            faults: Mutex::new(Vec::new()),
            transactional: true,
        }
    }

    pub fn non_transactional() -> Self {
        Self {
            transactional: false,
            ..Self::new()
        }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Fail every `op` on `collection`.
    pub fn fail(self, op: Op, collection: Collection) -> Self {
        self.push(Fault {
            op,
            collection,
            when: None,
            stall: None,
        })
    }

    /// Fail inserts/updates on `collection` whose fields carry `column = value`.
    pub fn fail_when(self, op: Op, collection: Collection, column: &str, value: impl Into<Value>) -> Self {
        self.push(Fault {
            op,
            collection,
            when: Some((column.to_string(), value.into())),
            stall: None,
        })
    }

    /// Delay every `op` on `collection` before answering.
    pub fn stall(self, op: Op, collection: Collection, delay: Duration) -> Self {
        self.push(Fault {
            op,
            collection,
            when: None,
            stall: Some(delay),
        })
    }

    fn push(self, fault: Fault) -> Self {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(fault);
        }
        self
    }

    async fn check(&self, op: Op, collection: Collection, fields: Option<&Fields>) -> Result<()> {
        let hit = {
            let faults = self.faults.lock().map_err(|e| StoreError::Backend(e.to_string()))?;
            faults
                .iter()
                .find(|f| {
                    f.op == op
                        && f.collection == collection
                        && match (&f.when, fields) {
                            (None, _) => true,
                            (Some((column, value)), Some(fields)) => fields.get(column) == Some(value),
                            (Some(_), None) => false,
                        }
                })
                .cloned()
        };

        match hit {
            None => Ok(()),
            Some(Fault { stall: Some(delay), .. }) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Some(_) => Err(StoreError::Backend(format!("injected {:?} failure on {}", op, collection))),
        }
    }
}

#[async_trait]
impl EntityStore for FaultInjectingStore {
    async fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Record>> {
        self.check(Op::FindOne, collection, None).await?;
        self.inner.find_one(collection, filter).await
    }

    async fn find_many(&self, collection: Collection, filter: &Filter) -> Result<Vec<Record>> {
        self.check(Op::FindMany, collection, None).await?;
        self.inner.find_many(collection, filter).await
    }

    async fn insert(&self, collection: Collection, fields: Fields) -> Result<Record> {
        self.check(Op::Insert, collection, Some(&fields)).await?;
        self.inner.insert(collection, fields).await
    }

    async fn update(&self, collection: Collection, id: &RowId, fields: Fields) -> Result<()> {
        self.check(Op::Update, collection, Some(&fields)).await?;
        self.inner.update(collection, id, fields).await
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        self.check(Op::Delete, collection, None).await?;
        self.inner.delete(collection, filter).await
    }

    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    async fn begin(&self) -> Result<()> {
        self.inner.begin().await
    }

    async fn commit(&self) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(&self) -> Result<()> {
        self.inner.rollback().await
    }
}

pub fn tree(company: CompanyInput) -> OrganizationTree {
    OrganizationTree {
        company,
        units: Vec::new(),
        collaborators: Vec::new(),
    }
}

pub async fn rows(store: &impl EntityStore, collection: Collection) -> Vec<Record> {
    store.find_many(collection, &Filter::new()).await.unwrap()
}

pub async fn row(store: &impl EntityStore, collection: Collection, id: &RowId) -> Option<Record> {
    store.find_one(collection, &Filter::by_id(id)).await.unwrap()
}

pub async fn add_form(store: &impl EntityStore, unit_id: &RowId) -> RowId {
    let mut fields = Fields::new();
    fields.insert("unit_id".into(), Value::from(unit_id));
    fields.insert("title".into(), Value::from("Climate survey"));
    store.insert(Collection::Forms, fields).await.unwrap().id
}
