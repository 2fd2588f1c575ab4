use std::time::Duration;
use thiserror::Error;

use super::{Collection, RowId};

/// Errors raised by an entity store adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Row {id} not found in '{collection}'")]
    RowNotFound { collection: Collection, id: RowId },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that stop a reconciliation run.
///
/// Everything else is collected into the run's report as a
/// [`Failure`](crate::report::Failure).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Company upsert failed: {0}")]
    FatalStore(StoreError),

    #[error("Company {0} not found or not authorized")]
    CompanyNotFound(RowId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store does not support transactions")]
    TransactionsUnsupported,

    #[error("Transaction control failed: {0}")]
    Transaction(StoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend(format!("serialization failed: {}", err))
    }
}
