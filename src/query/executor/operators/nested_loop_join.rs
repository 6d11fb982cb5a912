// Nested Loop Join
//
// For every outer row the inner side is re-initialized and scanned in
// full. INNER and LEFT joins only; LEFT pads unmatched outer rows with
// NULLs once the inner side is exhausted.

use crate::catalog::Schema;
use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::query::executor::result::{DataValue, ExecutionError, ExecutionResult, Tuple};
use crate::query::executor::Executor;
use crate::query::plan::{Expression, JoinType};

pub struct NestedLoopJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    join_type: JoinType,
    predicate: Expression,
    output_schema: Schema,
    left_tuple: Option<Tuple>,
    left_matched: bool,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        join_type: JoinType,
        predicate: Expression,
    ) -> ExecutionResult<Self> {
        if join_type != JoinType::Inner && join_type != JoinType::Left {
            return Err(ExecutionError::NotImplemented(format!(
                "join type {:?} not supported",
                join_type
            )));
        }
        let output_schema = left.output_schema().join(right.output_schema());
        Ok(Self {
            left,
            right,
            join_type,
            predicate,
            output_schema,
            left_tuple: None,
            left_matched: false,
        })
    }

    fn null_padding(&self) -> Tuple {
        let nulls = vec![DataValue::Null; self.right.output_schema().column_count()];
        Tuple::new(nulls)
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.left.init()?;
        self.right.init()?;
        self.left_tuple = self.left.next()?.map(|(tuple, _)| tuple);
        self.left_matched = false;
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        loop {
            let left_tuple = match &self.left_tuple {
                Some(tuple) => tuple.clone(),
                None => return Ok(None),
            };

            match self.right.next()? {
                None => {
                    if self.join_type == JoinType::Left && !self.left_matched {
                        self.left_matched = true;
                        let padded = left_tuple.join(&self.null_padding());
                        return Ok(Some((padded, Rid::new(INVALID_PAGE_ID, 0))));
                    }
                    // Inner side exhausted: rewind it and step the outer.
                    self.right.init()?;
                    self.left_tuple = self.left.next()?.map(|(tuple, _)| tuple);
                    self.left_matched = false;
                }
                Some((right_tuple, _)) => {
                    let verdict = self.predicate.evaluate_join(&left_tuple, &right_tuple);
                    if verdict == DataValue::Boolean(true) {
                        self.left_matched = true;
                        let joined = left_tuple.join(&right_tuple);
                        return Ok(Some((joined, Rid::new(INVALID_PAGE_ID, 0))));
                    }
                }
            }
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.output_schema
    }
}
