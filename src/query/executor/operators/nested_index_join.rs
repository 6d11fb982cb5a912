// Nested Index Join
//
// For every outer row, evaluates the key expression and probes the named
// index of the inner table instead of scanning it. INNER and LEFT only.

use std::sync::Arc;

use crate::catalog::{IndexInfo, Schema, TableInfo};
use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::query::executor::result::{DataValue, ExecutionError, ExecutionResult, Tuple};
use crate::query::executor::Executor;
use crate::query::plan::{Expression, JoinType};

pub struct NestedIndexJoinExecutor {
    child: Box<dyn Executor>,
    inner_table: Arc<TableInfo>,
    index: Arc<IndexInfo>,
    join_type: JoinType,
    key_expression: Expression,
    output_schema: Schema,
    outer_tuple: Option<Tuple>,
    pending_rids: Vec<Rid>,
}

impl NestedIndexJoinExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        inner_table: Arc<TableInfo>,
        index: Arc<IndexInfo>,
        join_type: JoinType,
        key_expression: Expression,
    ) -> ExecutionResult<Self> {
        if join_type != JoinType::Inner && join_type != JoinType::Left {
            return Err(ExecutionError::NotImplemented(format!(
                "join type {:?} not supported",
                join_type
            )));
        }
        let output_schema = child.output_schema().join(&inner_table.schema);
        Ok(Self {
            child,
            inner_table,
            index,
            join_type,
            key_expression,
            output_schema,
            outer_tuple: None,
            pending_rids: Vec::new(),
        })
    }

    fn null_padding(&self) -> Tuple {
        Tuple::new(vec![DataValue::Null; self.inner_table.schema.column_count()])
    }
}

impl Executor for NestedIndexJoinExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.child.init()?;
        self.outer_tuple = None;
        self.pending_rids.clear();
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        loop {
            if let Some(rid) = self.pending_rids.pop() {
                let outer = match &self.outer_tuple {
                    Some(tuple) => tuple.clone(),
                    None => continue,
                };
                let bytes = self.inner_table.heap.get_tuple(rid)?;
                let inner = Tuple::from_bytes(&bytes)?;
                return Ok(Some((outer.join(&inner), Rid::new(INVALID_PAGE_ID, 0))));
            }

            let (outer, _) = match self.child.next()? {
                Some(row) => row,
                None => return Ok(None),
            };

            let matches = match self.key_expression.evaluate(&outer) {
                DataValue::Integer(key) => self.index.index.get_value(&key)?,
                // A NULL or non-integer key matches nothing.
                _ => None,
            };
            self.pending_rids = matches.into_iter().collect();
            self.outer_tuple = Some(outer.clone());

            if self.pending_rids.is_empty() && self.join_type == JoinType::Left {
                let padded = outer.join(&self.null_padding());
                return Ok(Some((padded, Rid::new(INVALID_PAGE_ID, 0))));
            }
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.output_schema
    }
}
