// Delete
//
// One-shot executor: drains its child, X-locks each row, marks it
// deleted in the heap and removes it from every index, then emits a
// single count row.

use std::sync::Arc;

use crate::catalog::{Column, DataType, Schema, TableInfo};
use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::query::executor::context::ExecutorContext;
use crate::query::executor::result::{DataValue, ExecutionResult, Tuple};
use crate::query::executor::Executor;
use crate::transaction::concurrency::lock_manager::LockMode;

pub struct DeleteExecutor {
    ctx: Arc<ExecutorContext>,
    table: Arc<TableInfo>,
    child: Box<dyn Executor>,
    output_schema: Schema,
    done: bool,
}

impl DeleteExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, table: Arc<TableInfo>, child: Box<dyn Executor>) -> Self {
        Self {
            ctx,
            table,
            child,
            output_schema: Schema::new(vec![Column::new("deleted", DataType::Integer)]),
            done: false,
        }
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.child.init()?;
        self.done = false;
        self.ctx.lock_manager.lock_table(
            &self.ctx.transaction,
            LockMode::IntentionExclusive,
            self.table.oid,
        )?;
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let indexes = self.ctx.catalog.get_table_indexes(self.table.oid);
        let mut count: i64 = 0;
        while let Some((tuple, rid)) = self.child.next()? {
            self.ctx.lock_manager.lock_row(
                &self.ctx.transaction,
                LockMode::Exclusive,
                self.table.oid,
                rid,
            )?;
            if self.table.heap.mark_delete(rid)? {
                for index in &indexes {
                    let key = tuple.key_at(index.key_column)?;
                    index.index.remove(&key)?;
                }
                count += 1;
            }
        }

        let output = Tuple::new(vec![DataValue::Integer(count)]);
        Ok(Some((output, Rid::new(INVALID_PAGE_ID, 0))))
    }

    fn output_schema(&self) -> &Schema {
        &self.output_schema
    }
}
