use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use super::{EntityStore, Filter};
use crate::core::{Collection, Fields, Record, Result, RowId, StoreError};

/// Decorator bounding every call of the wrapped store with a deadline.
///
/// Without a deadline calls are passed straight through.
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Option<Duration>,
}

impl<S: EntityStore> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self::with_deadline(inner, Some(timeout))
    }

    pub fn with_deadline(inner: S, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| StoreError::Timeout(limit))?,
            None => call.await,
        }
    }
}

#[async_trait]
impl<S: EntityStore> EntityStore for TimeoutStore<S> {
    async fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Record>> {
        self.bounded(self.inner.find_one(collection, filter)).await
    }

    async fn find_many(&self, collection: Collection, filter: &Filter) -> Result<Vec<Record>> {
        self.bounded(self.inner.find_many(collection, filter)).await
    }

    async fn insert(&self, collection: Collection, fields: Fields) -> Result<Record> {
        self.bounded(self.inner.insert(collection, fields)).await
    }

    async fn update(&self, collection: Collection, id: &RowId, fields: Fields) -> Result<()> {
        self.bounded(self.inner.update(collection, id, fields)).await
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        self.bounded(self.inner.delete(collection, filter)).await
    }

    fn supports_transactions(&self) -> bool {
        self.inner.supports_transactions()
    }

    async fn begin(&self) -> Result<()> {
        self.bounded(self.inner.begin()).await
    }

    async fn commit(&self) -> Result<()> {
        self.bounded(self.inner.commit()).await
    }

    async fn rollback(&self) -> Result<()> {
        self.bounded(self.inner.rollback()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    struct StalledStore;

    #[async_trait]
    impl EntityStore for StalledStore {
        async fn find_one(&self, _: Collection, _: &Filter) -> Result<Option<Record>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn find_many(&self, _: Collection, _: &Filter) -> Result<Vec<Record>> {
            Ok(Vec::new())
        }

        async fn insert(&self, collection: Collection, _: Fields) -> Result<Record> {
            Err(StoreError::UnsupportedOperation(format!("insert into {}", collection)))
        }

        async fn update(&self, collection: Collection, id: &RowId, _: Fields) -> Result<()> {
            Err(StoreError::RowNotFound {
                collection,
                id: id.clone(),
            })
        }

        async fn delete(&self, _: Collection, _: &Filter) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let store = TimeoutStore::new(StalledStore, Duration::from_millis(50));
        let res = store.find_one(Collection::Sectors, &Filter::new()).await;
        assert_eq!(res, Err(StoreError::Timeout(Duration::from_millis(50))));

        let fast = store.find_many(Collection::Sectors, &Filter::new()).await;
        assert_eq!(fast, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn test_passes_transactions_through() {
        let store = TimeoutStore::new(InMemoryStore::new(), Duration::from_secs(1));
        assert!(store.supports_transactions());
        store.begin().await.unwrap();
        store.commit().await.unwrap();
        assert!(!StalledStore.supports_transactions());
    }

    #[tokio::test]
    async fn test_without_deadline_calls_pass_through() {
        let store = TimeoutStore::with_deadline(InMemoryStore::new(), None);
        assert_eq!(store.timeout(), None);
        assert!(store.supports_transactions());

        let slow = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(7)
        };
        assert_eq!(store.bounded(slow).await, Ok(7));
    }
}
