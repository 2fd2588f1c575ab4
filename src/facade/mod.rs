pub mod reconciler;
pub mod transactions;

pub use reconciler::Reconciler;
pub use transactions::TransactionGuard;
