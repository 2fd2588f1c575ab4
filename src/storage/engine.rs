use async_trait::async_trait;
use std::sync::Arc;

use super::Filter;
use crate::core::{Collection, Fields, Record, Result, RowId, StoreError};

/// Narrow interface over the relational backend.
///
/// Filters are plain equality/`IN` predicates; the reconciliation engine
/// performs its own multi-step resolution instead of asking for joins.
/// Timeouts belong to the implementation (see [`TimeoutStore`](super::TimeoutStore)).
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// First row matching `filter`, if any.
    async fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Record>>;

    /// All rows matching `filter`.
    async fn find_many(&self, collection: Collection, filter: &Filter) -> Result<Vec<Record>>;

    /// Insert a row; the store assigns the id.
    async fn insert(&self, collection: Collection, fields: Fields) -> Result<Record>;

    /// Overwrite the given fields of row `id`; other fields are kept.
    async fn update(&self, collection: Collection, id: &RowId, fields: Fields) -> Result<()>;

    /// Delete all rows matching `filter` and return how many were removed.
    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64>;

    fn supports_transactions(&self) -> bool {
        false
    }

    async fn begin(&self) -> Result<()> {
        Err(StoreError::UnsupportedOperation("BEGIN".into()))
    }

    async fn commit(&self) -> Result<()> {
        Err(StoreError::UnsupportedOperation("COMMIT".into()))
    }

    async fn rollback(&self) -> Result<()> {
        Err(StoreError::UnsupportedOperation("ROLLBACK".into()))
    }
}

#[async_trait]
impl<S: EntityStore + ?Sized> EntityStore for Arc<S> {
    async fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Record>> {
        (**self).find_one(collection, filter).await
    }

    async fn find_many(&self, collection: Collection, filter: &Filter) -> Result<Vec<Record>> {
        (**self).find_many(collection, filter).await
    }

    async fn insert(&self, collection: Collection, fields: Fields) -> Result<Record> {
        (**self).insert(collection, fields).await
    }

    async fn update(&self, collection: Collection, id: &RowId, fields: Fields) -> Result<()> {
        (**self).update(collection, id, fields).await
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        (**self).delete(collection, filter).await
    }

    fn supports_transactions(&self) -> bool {
        (**self).supports_transactions()
    }

    async fn begin(&self) -> Result<()> {
        (**self).begin().await
    }

    async fn commit(&self) -> Result<()> {
        (**self).commit().await
    }

    async fn rollback(&self) -> Result<()> {
        (**self).rollback().await
    }
}
