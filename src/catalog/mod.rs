// Catalog Management Module
//
// Schema metadata for tables and indexes: enough surface for the
// executor layer to resolve names, heaps, schemas and index handles.

pub mod schema;
pub mod table;

pub use schema::{Column, DataType, Schema};
pub use table::{IndexInfo, TableInfo};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::common::types::TableOid;
use crate::index::btree::{BTreeError, BTreeIndex};
use crate::query::executor::result::DataValue;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::heap::{HeapError, TableHeap};

/// Key type of executor-visible indexes: one integer column.
pub type IndexKey = i64;

/// Default node capacities for catalog-created indexes.
const INDEX_LEAF_MAX_SIZE: usize = 64;
const INDEX_INTERNAL_MAX_SIZE: usize = 65;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Table {0} not found")]
    TableNotFound(String),
    #[error("Table oid {0} not found")]
    TableOidNotFound(TableOid),
    #[error("Index {0} not found")]
    IndexNotFound(String),
    #[error("Table {0} already exists")]
    TableExists(String),
    #[error("Heap error: {0}")]
    Heap(#[from] HeapError),
    #[error("Index error: {0}")]
    Index(#[from] BTreeError),
    #[error("Tuple decode error: {0}")]
    TupleCodec(String),
}

/// The catalog: name/oid resolution for tables and their indexes.
pub struct Catalog {
    buffer_pool: Arc<BufferPoolManager>,
    tables: RwLock<HashMap<TableOid, Arc<TableInfo>>>,
    table_names: RwLock<HashMap<String, TableOid>>,
    indexes: RwLock<HashMap<(TableOid, String), Arc<IndexInfo>>>,
    next_table_oid: AtomicU32,
}

impl Catalog {
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            tables: RwLock::new(HashMap::new()),
            table_names: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
            next_table_oid: AtomicU32::new(1),
        }
    }

    /// Create a table and its backing heap.
    pub fn create_table(
        &self,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<Arc<TableInfo>, CatalogError> {
        let name = name.into();
        if self.table_names.read().contains_key(&name) {
            return Err(CatalogError::TableExists(name));
        }

        let oid = self.next_table_oid.fetch_add(1, Ordering::SeqCst);
        let heap = Arc::new(TableHeap::new(self.buffer_pool.clone())?);
        let info = Arc::new(TableInfo { oid, name: name.clone(), schema, heap });

        self.tables.write().insert(oid, info.clone());
        self.table_names.write().insert(name, oid);
        Ok(info)
    }

    pub fn get_table(&self, oid: TableOid) -> Result<Arc<TableInfo>, CatalogError> {
        self.tables.read().get(&oid).cloned().ok_or(CatalogError::TableOidNotFound(oid))
    }

    pub fn get_table_by_name(&self, name: &str) -> Result<Arc<TableInfo>, CatalogError> {
        let oid = *self
            .table_names
            .read()
            .get(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))?;
        self.get_table(oid)
    }

    /// Create a B+Tree index over one integer column of a table.
    pub fn create_index(
        &self,
        index_name: impl Into<String>,
        table_oid: TableOid,
        key_column: usize,
    ) -> Result<Arc<IndexInfo>, CatalogError> {
        let index_name = index_name.into();
        let table = self.get_table(table_oid)?;

        let index = Arc::new(BTreeIndex::<IndexKey>::new(
            index_name.clone(),
            self.buffer_pool.clone(),
            INDEX_LEAF_MAX_SIZE,
            INDEX_INTERNAL_MAX_SIZE,
        )?);

        // Backfill from rows the table already holds.
        for entry in table.heap.iter() {
            let (rid, bytes) = entry?;
            let values: Vec<DataValue> = bincode::deserialize(&bytes)
                .map_err(|e| CatalogError::TupleCodec(e.to_string()))?;
            if let Some(DataValue::Integer(key)) = values.get(key_column) {
                index.insert(*key, rid)?;
            }
        }

        let info = Arc::new(IndexInfo {
            name: index_name.clone(),
            table_oid,
            table_name: table.name.clone(),
            key_column,
            index,
        });
        self.indexes.write().insert((table_oid, index_name), info.clone());
        Ok(info)
    }

    pub fn get_index(
        &self,
        index_name: &str,
        table_oid: TableOid,
    ) -> Result<Arc<IndexInfo>, CatalogError> {
        self.indexes
            .read()
            .get(&(table_oid, index_name.to_string()))
            .cloned()
            .ok_or_else(|| CatalogError::IndexNotFound(index_name.to_string()))
    }

    /// Every index declared on the table.
    pub fn get_table_indexes(&self, table_oid: TableOid) -> Vec<Arc<IndexInfo>> {
        self.indexes
            .read()
            .iter()
            .filter(|((oid, _), _)| *oid == table_oid)
            .map(|(_, info)| info.clone())
            .collect()
    }
}
