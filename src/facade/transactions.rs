use tracing::{Level, event};

use crate::config::TransactionMode;
use crate::core::{SyncError, SyncResult};
use crate::report::Outcome;
use crate::storage::EntityStore;

/// Open store transaction for one run, or nothing in best-effort mode.
///
/// Must be closed with [`finish`](Self::finish) or [`abort`](Self::abort).
pub struct TransactionGuard<'a, S: ?Sized> {
    store: &'a S,
    active: bool,
}

impl<'a, S: EntityStore + ?Sized> TransactionGuard<'a, S> {
    pub async fn begin(store: &'a S, mode: TransactionMode) -> SyncResult<Self> {
        let active = match mode {
            TransactionMode::BestEffort => false,
            TransactionMode::Atomic if !store.supports_transactions() => {
                return Err(SyncError::TransactionsUnsupported);
            }
            TransactionMode::Auto if !store.supports_transactions() => false,
            TransactionMode::Atomic | TransactionMode::Auto => {
                store.begin().await.map_err(SyncError::Transaction)?;
                true
            }
        };

        if active {
            event!(Level::DEBUG, "transaction started");
        }
        Ok(Self { store, active })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Commit when `keep` is set, roll back otherwise.
    pub async fn finish(self, keep: bool) -> SyncResult<Outcome> {
        if !self.active {
            return Ok(Outcome::BestEffort);
        }

        if !keep {
            self.store.rollback().await.map_err(SyncError::Transaction)?;
            event!(Level::WARN, "transaction rolled back");
            return Ok(Outcome::RolledBack);
        }

        if let Err(err) = self.store.commit().await {
            if let Err(rollback_err) = self.store.rollback().await {
                event!(Level::ERROR, error = %rollback_err, "rollback after failed COMMIT also failed");
            }
            return Err(SyncError::Transaction(err));
        }
        event!(Level::DEBUG, "transaction committed");
        Ok(Outcome::Committed)
    }

    /// Roll back after a fatal error; the rollback result is only logged.
    pub async fn abort(self) {
        if self.active
            && let Err(err) = self.store.rollback().await
        {
            event!(Level::ERROR, error = %err, "rollback failed");
        }
    }
}
