// Sequential Scan
//
// Walks a table heap in storage order. Under locking isolation levels
// the scan holds IS on the table and S on every row it returns; READ
// COMMITTED hands all of them back as soon as the scan is exhausted.

use std::sync::Arc;

use crate::catalog::{Schema, TableInfo};
use crate::common::types::Rid;
use crate::query::executor::context::ExecutorContext;
use crate::query::executor::result::{ExecutionResult, Tuple};
use crate::query::executor::Executor;
use crate::storage::heap::TableIterator;
use crate::transaction::concurrency::lock_manager::LockMode;
use crate::transaction::concurrency::transaction::IsolationLevel;

pub struct SeqScanExecutor {
    ctx: Arc<ExecutorContext>,
    table: Arc<TableInfo>,
    iter: Option<TableIterator>,
    locked_rows: Vec<Rid>,
    table_locked: bool,
    exhausted: bool,
}

impl SeqScanExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, table: Arc<TableInfo>) -> Self {
        Self { ctx, table, iter: None, locked_rows: Vec::new(), table_locked: false, exhausted: false }
    }

    fn uses_locks(&self) -> bool {
        self.ctx.transaction.isolation_level() != IsolationLevel::ReadUncommitted
    }

    /// READ COMMITTED releases its read locks at end of scan; the
    /// stronger level keeps them until commit. Rows a parent operator
    /// upgraded to X (and a table upgraded past IS) are left alone.
    fn release_read_locks(&mut self) -> ExecutionResult<()> {
        if self.ctx.transaction.isolation_level() != IsolationLevel::ReadCommitted {
            return Ok(());
        }
        for rid in self.locked_rows.drain(..) {
            if self.ctx.transaction.holds_shared_row_lock(self.table.oid, rid) {
                self.ctx.lock_manager.unlock_row(&self.ctx.transaction, self.table.oid, rid)?;
            }
        }
        if self.table_locked {
            if self.ctx.transaction.holds_intention_shared_table_lock(self.table.oid) {
                self.ctx.lock_manager.unlock_table(&self.ctx.transaction, self.table.oid)?;
            }
            self.table_locked = false;
        }
        Ok(())
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        if self.uses_locks() {
            self.ctx.lock_manager.lock_table(
                &self.ctx.transaction,
                LockMode::IntentionShared,
                self.table.oid,
            )?;
            self.table_locked = true;
        }
        self.iter = Some(self.table.heap.iter());
        self.locked_rows.clear();
        self.exhausted = false;
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        if self.exhausted {
            return Ok(None);
        }
        let iter = match self.iter.as_mut() {
            Some(iter) => iter,
            None => return Ok(None),
        };

        match iter.next() {
            Some(Ok((rid, bytes))) => {
                if self.uses_locks() {
                    self.ctx.lock_manager.lock_row(
                        &self.ctx.transaction,
                        LockMode::Shared,
                        self.table.oid,
                        rid,
                    )?;
                    self.locked_rows.push(rid);
                }
                Ok(Some((Tuple::from_bytes(&bytes)?, rid)))
            }
            Some(Err(e)) => Err(e.into()),
            None => {
                self.exhausted = true;
                self.release_read_locks()?;
                Ok(None)
            }
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.table.schema
    }
}
