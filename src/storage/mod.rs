pub mod engine;
pub mod filter;
pub mod memory;
pub mod persistence;
pub mod schema;
pub mod timeout;

pub use engine::EntityStore;
pub use filter::{Condition, Filter};
pub use memory::InMemoryStore;
pub use persistence::{SnapshotFile, StoreSnapshot};
pub use schema::{ForeignKey, ORGANIZATION_FOREIGN_KEYS};
pub use timeout::TimeoutStore;
