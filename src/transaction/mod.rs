// Transaction Module
//
// Transactions, their lifecycle management, and the multi-granularity
// lock manager with background deadlock detection.

pub mod concurrency;

pub use concurrency::lock_manager::{LockManager, LockMode};
pub use concurrency::transaction::{
    AbortReason, IsolationLevel, Transaction, TransactionError, TransactionState,
};
pub use concurrency::transaction_manager::TransactionManager;
