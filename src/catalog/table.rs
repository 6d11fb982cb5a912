use std::sync::Arc;

use crate::catalog::schema::Schema;
use crate::catalog::IndexKey;
use crate::common::types::TableOid;
use crate::index::btree::BTreeIndex;
use crate::storage::heap::TableHeap;

/// A table as the executors see it: schema plus its heap.
pub struct TableInfo {
    pub oid: TableOid,
    pub name: String,
    pub schema: Schema,
    pub heap: Arc<TableHeap>,
}

/// An index as the executors see it: which column it covers and the tree
/// behind it.
pub struct IndexInfo {
    pub name: String,
    pub table_oid: TableOid,
    pub table_name: String,
    pub key_column: usize,
    pub index: Arc<BTreeIndex<IndexKey>>,
}
