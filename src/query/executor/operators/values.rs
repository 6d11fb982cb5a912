// Values
//
// Emits a fixed list of rows; the canonical child of Insert.

use crate::catalog::Schema;
use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::query::executor::result::{DataValue, ExecutionResult, Tuple};
use crate::query::executor::Executor;

pub struct ValuesExecutor {
    schema: Schema,
    rows: Vec<Vec<DataValue>>,
    pos: usize,
}

impl ValuesExecutor {
    pub fn new(schema: Schema, rows: Vec<Vec<DataValue>>) -> Self {
        Self { schema, rows, pos: 0 }
    }
}

impl Executor for ValuesExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.pos = 0;
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        if self.pos >= self.rows.len() {
            return Ok(None);
        }
        let row = Tuple::new(self.rows[self.pos].clone());
        self.pos += 1;
        Ok(Some((row, Rid::new(INVALID_PAGE_ID, 0))))
    }

    fn output_schema(&self) -> &Schema {
        &self.schema
    }
}
