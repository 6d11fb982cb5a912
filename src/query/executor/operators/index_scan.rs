// Index Scan
//
// Snapshots the index's rid list in key order at init (page latches are
// held only inside the tree iterator), then fetches tuples by rid.

use std::sync::Arc;

use crate::catalog::{IndexInfo, Schema, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::result::{ExecutionResult, Tuple};
use crate::query::executor::Executor;

pub struct IndexScanExecutor {
    table: Arc<TableInfo>,
    index: Arc<IndexInfo>,
    rids: Vec<Rid>,
    pos: usize,
}

impl IndexScanExecutor {
    pub fn new(table: Arc<TableInfo>, index: Arc<IndexInfo>) -> Self {
        Self { table, index, rids: Vec::new(), pos: 0 }
    }
}

impl Executor for IndexScanExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.rids = self.index.index.iter()?.map(|(_, rid)| rid).collect();
        self.pos = 0;
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        if self.pos >= self.rids.len() {
            return Ok(None);
        }
        let rid = self.rids[self.pos];
        self.pos += 1;
        let bytes = self.table.heap.get_tuple(rid)?;
        Ok(Some((Tuple::from_bytes(&bytes)?, rid)))
    }

    fn output_schema(&self) -> &Schema {
        &self.table.schema
    }
}
