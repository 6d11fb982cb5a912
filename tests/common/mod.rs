use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::NamedTempFile;

use taigadb::catalog::{Catalog, Column, DataType, Schema};
use taigadb::query::executor::context::ExecutorContext;
use taigadb::storage::buffer::BufferPoolManager;
use taigadb::transaction::concurrency::lock_manager::LockManager;
use taigadb::transaction::concurrency::transaction::IsolationLevel;
use taigadb::transaction::concurrency::transaction_manager::TransactionManager;

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a buffer pool manager backed by a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(
    pool_size: usize,
) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, 2, path)?);
    Ok((buffer_pool, file))
}

/// Everything a query test needs, wired together.
#[allow(dead_code)]
pub struct TestDb {
    pub buffer_pool: Arc<BufferPoolManager>,
    pub catalog: Arc<Catalog>,
    pub lock_manager: Arc<LockManager>,
    pub txn_manager: Arc<TransactionManager>,
    _file: NamedTempFile,
}

#[allow(dead_code)]
impl TestDb {
    pub fn new(pool_size: usize) -> Result<Self> {
        let (buffer_pool, file) = create_test_buffer_pool(pool_size)?;
        let catalog = Arc::new(Catalog::new(buffer_pool.clone()));
        let lock_manager = LockManager::new(Duration::from_millis(20));
        let txn_manager = TransactionManager::new(lock_manager.clone());
        Ok(Self { buffer_pool, catalog, lock_manager, txn_manager, _file: file })
    }

    pub fn context(&self, isolation_level: IsolationLevel) -> Arc<ExecutorContext> {
        let txn = self.txn_manager.begin(isolation_level);
        Arc::new(ExecutorContext::new(
            self.buffer_pool.clone(),
            self.catalog.clone(),
            self.lock_manager.clone(),
            self.txn_manager.clone(),
            txn,
        ))
    }
}

// A two-column (id INTEGER, name TEXT) schema used across executor tests
#[allow(dead_code)]
pub fn id_name_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", DataType::Integer),
        Column::new("name", DataType::Text),
    ])
}
