use std::sync::Arc;

use crate::catalog::Catalog;
use crate::storage::buffer::BufferPoolManager;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::Transaction;
use crate::transaction::concurrency::transaction_manager::TransactionManager;

/// Everything an executor needs to run: the owning transaction plus
/// handles to the shared subsystems.
pub struct ExecutorContext {
    pub buffer_pool: Arc<BufferPoolManager>,
    pub catalog: Arc<Catalog>,
    pub lock_manager: Arc<LockManager>,
    pub txn_manager: Arc<TransactionManager>,
    pub transaction: Arc<Transaction>,
}

impl ExecutorContext {
    pub fn new(
        buffer_pool: Arc<BufferPoolManager>,
        catalog: Arc<Catalog>,
        lock_manager: Arc<LockManager>,
        txn_manager: Arc<TransactionManager>,
        transaction: Arc<Transaction>,
    ) -> Self {
        Self { buffer_pool, catalog, lock_manager, txn_manager, transaction }
    }
}
