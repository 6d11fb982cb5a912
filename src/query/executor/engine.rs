// Execution Engine
//
// Builds an executor tree from a plan (applying the TopN rewrite first)
// and drains it to completion.

use std::sync::Arc;

use crate::common::types::Rid;
use crate::query::executor::context::ExecutorContext;
use crate::query::executor::operators::{
    DeleteExecutor, IndexScanExecutor, InsertExecutor, LimitExecutor, NestedIndexJoinExecutor,
    NestedLoopJoinExecutor, SeqScanExecutor, SortExecutor, TopNExecutor, ValuesExecutor,
};
use crate::query::executor::result::{ExecutionResult, Tuple};
use crate::query::executor::Executor;
use crate::query::plan::{sort_limit_as_topn, PlanNode};

pub struct ExecutionEngine {
    ctx: Arc<ExecutorContext>,
}

impl ExecutionEngine {
    pub fn new(ctx: Arc<ExecutorContext>) -> Self {
        Self { ctx }
    }

    /// Optimize the plan, build its executor tree, and pull every row.
    pub fn execute(&self, plan: PlanNode) -> ExecutionResult<Vec<(Tuple, Rid)>> {
        let plan = sort_limit_as_topn(plan);
        let mut executor = self.build_executor(&plan)?;
        executor.init()?;
        let mut rows = Vec::new();
        while let Some(row) = executor.next()? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn build_executor(&self, plan: &PlanNode) -> ExecutionResult<Box<dyn Executor>> {
        match plan {
            PlanNode::SeqScan(p) => {
                let table = self.ctx.catalog.get_table(p.table_oid)?;
                Ok(Box::new(SeqScanExecutor::new(self.ctx.clone(), table)))
            }
            PlanNode::IndexScan(p) => {
                let table = self.ctx.catalog.get_table(p.table_oid)?;
                let index = self.ctx.catalog.get_index(&p.index_name, p.table_oid)?;
                Ok(Box::new(IndexScanExecutor::new(table, index)))
            }
            PlanNode::Insert(p) => {
                let table = self.ctx.catalog.get_table(p.table_oid)?;
                let child = self.build_executor(&p.child)?;
                Ok(Box::new(InsertExecutor::new(self.ctx.clone(), table, child)))
            }
            PlanNode::Delete(p) => {
                let table = self.ctx.catalog.get_table(p.table_oid)?;
                let child = self.build_executor(&p.child)?;
                Ok(Box::new(DeleteExecutor::new(self.ctx.clone(), table, child)))
            }
            PlanNode::NestedLoopJoin(p) => {
                let left = self.build_executor(&p.left)?;
                let right = self.build_executor(&p.right)?;
                Ok(Box::new(NestedLoopJoinExecutor::new(
                    left,
                    right,
                    p.join_type,
                    p.predicate.clone(),
                )?))
            }
            PlanNode::NestedIndexJoin(p) => {
                let child = self.build_executor(&p.child)?;
                let table = self.ctx.catalog.get_table(p.inner_table_oid)?;
                let index = self.ctx.catalog.get_index(&p.index_name, p.inner_table_oid)?;
                Ok(Box::new(NestedIndexJoinExecutor::new(
                    child,
                    table,
                    index,
                    p.join_type,
                    p.key_expression.clone(),
                )?))
            }
            PlanNode::Sort(p) => {
                let child = self.build_executor(&p.child)?;
                Ok(Box::new(SortExecutor::new(child, p.order_by.clone())))
            }
            PlanNode::TopN(p) => {
                let child = self.build_executor(&p.child)?;
                Ok(Box::new(TopNExecutor::new(child, p.order_by.clone(), p.n)))
            }
            PlanNode::Limit(p) => {
                let child = self.build_executor(&p.child)?;
                Ok(Box::new(LimitExecutor::new(child, p.limit)))
            }
            PlanNode::Values(p) => {
                Ok(Box::new(ValuesExecutor::new(p.schema.clone(), p.rows.clone())))
            }
        }
    }
}
