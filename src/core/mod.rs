pub mod error;
pub mod types;
pub mod value;

pub use error::{Result, StoreError, SyncError, SyncResult};
pub use types::{Collection, Fields, Record};
pub use value::{RowId, Value};
