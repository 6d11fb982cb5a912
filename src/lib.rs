// Export public modules
pub mod catalog;
pub mod common;
pub mod index;
pub mod query;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use catalog::Catalog;
pub use index::btree::{BTreeError, BTreeIndex};
pub use query::executor::{ExecutionEngine, Executor, ExecutorContext};
pub use storage::buffer::{BufferPoolError, BufferPoolManager};
pub use storage::disk::DiskManager;
pub use storage::heap::TableHeap;
pub use transaction::{IsolationLevel, LockManager, LockMode, TransactionManager};
