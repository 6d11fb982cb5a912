// Top-N
//
// Keeps the N best rows of the child in a bounded heap: the heap is
// ordered worst-first, so exceeding N pops the current worst. Working
// memory stays O(N) regardless of child size.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::catalog::Schema;
use crate::common::types::Rid;
use crate::query::executor::operators::sort::compare_by_keys;
use crate::query::executor::result::{ExecutionResult, Tuple};
use crate::query::executor::Executor;
use crate::query::plan::OrderBy;

struct HeapEntry {
    tuple: Tuple,
    rid: Rid,
    order_by: Arc<Vec<OrderBy>>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: the entry sorting last under the
        // order-by list sits on top and is evicted first.
        compare_by_keys(&self.tuple, &other.tuple, &self.order_by)
    }
}

pub struct TopNExecutor {
    child: Box<dyn Executor>,
    order_by: Arc<Vec<OrderBy>>,
    n: usize,
    sorted: Vec<(Tuple, Rid)>,
    pos: usize,
}

impl TopNExecutor {
    pub fn new(child: Box<dyn Executor>, order_by: Vec<OrderBy>, n: usize) -> Self {
        Self { child, order_by: Arc::new(order_by), n, sorted: Vec::new(), pos: 0 }
    }
}

impl Executor for TopNExecutor {
    fn init(&mut self) -> ExecutionResult<()> {
        self.child.init()?;
        self.pos = 0;

        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(self.n + 1);
        while let Some((tuple, rid)) = self.child.next()? {
            heap.push(HeapEntry { tuple, rid, order_by: self.order_by.clone() });
            if heap.len() > self.n {
                heap.pop();
            }
        }

        self.sorted =
            heap.into_sorted_vec().into_iter().map(|entry| (entry.tuple, entry.rid)).collect();
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
