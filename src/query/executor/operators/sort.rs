// Sort
//
// Materializes the child at init and sorts by the order-by list; earlier
// keys dominate, later keys break ties, and the sort itself is stable.

use std::cmp::Ordering;

use crate::catalog::Schema;
use crate::common::types::Rid;
use crate::query::executor::result::{ExecutionResult, Tuple};
use crate::query::executor::Executor;
use crate::query::plan::{OrderBy, OrderDirection};

pub struct SortExecutor {
    child: Box<dyn Executor>,
    order_by: Vec<OrderBy>,
    sorted: Vec<(Tuple, Rid)>,
    pos: usize,
}

impl SortExecutor {
    pub fn new(child: Box<dyn Executor>, order_by: Vec<OrderBy>) -> Self {
        Self { child, order_by, sorted: Vec::new(), pos: 0 }
    }
}

/// Compare two tuples under an order-by list.
pub(crate) fn compare_by_keys(a: &Tuple, b: &Tuple, order_by: &[OrderBy]) -> Ordering {
    for key in order_by {
        let va = key.expression.evaluate(a);
        let vb = key.expression.evaluate(b);
        let ordering = va.total_cmp(&vb);
        if ordering != Ordering::Equal {
            return match key.direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            };
        }
    }
    Ordering::Equal
}

impl Executor for SortExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.child.init()?;
        self.sorted.clear();
        self.pos = 0;
        while let Some(row) = self.child.next()? {
            self.sorted.push(row);
        }
        let order_by = std::mem::take(&mut self.order_by);
        self.sorted.sort_by(|(a, _), (b, _)| compare_by_keys(a, b, &order_by));
        self.order_by = order_by;
        Ok(())
    }

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>> {
        if self.pos >= self.sorted.len() {
            return Ok(None);
        }
        let row = self.sorted[self.pos].clone();
        self.pos += 1;
        Ok(Some(row))
    }

    fn output_schema(&self) -> &Schema {
        self.child.output_schema()
    }
}
