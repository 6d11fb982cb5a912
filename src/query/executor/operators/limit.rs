// Limit
//
// Passes through at most `limit` rows of its child.

use crate::catalog::Schema;
use crate::common::types::Rid;
use crate::query::executor::result::{ExecutionResult, Tuple};
use crate::query::executor::Executor;

pub struct LimitExecutor {
    child: Box<dyn Executor>,
    limit: usize,
    emitted: usize,
}

impl LimitExecutor {
    pub fn new(child: Box<dyn Executor>, limit: usize) -> Self {
        Self { child, limit, emitted: 0 }
    }
}

impl Executor for LimitExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.child.init()?;
        self.emitted = 0;
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        if self.emitted >= self.limit {
            return Ok(None);
        }
        match self.child.next()? {
            Some(row) => {
                self.emitted += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn output_schema(&self) -> &Schema {
        self.child.output_schema()
    }
}
