// Plan Nodes
//
// Opaque, read-only descriptions of what to execute. The planner and
// binder that would produce these live outside this crate; tests and the
// execution engine construct them directly.

pub mod expression;
pub mod optimizer;

pub use expression::{CompareOp, Expression, JoinSide};
pub use optimizer::sort_limit_as_topn;

use crate::catalog::Schema;
use crate::common::types::TableOid;
use crate::query::executor::result::DataValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub direction: OrderDirection,
    pub expression: Expression,
}

#[derive(Debug, Clone)]
pub enum PlanNode {
    SeqScan(SeqScanPlan),
    IndexScan(IndexScanPlan),
    Insert(InsertPlan),
    Delete(DeletePlan),
    NestedLoopJoin(NestedLoopJoinPlan),
    NestedIndexJoin(NestedIndexJoinPlan),
    Sort(SortPlan),
    TopN(TopNPlan),
    Limit(LimitPlan),
    Values(ValuesPlan),
}

#[derive(Debug, Clone)]
pub struct SeqScanPlan {
    pub table_oid: TableOid,
}

#[derive(Debug, Clone)]
pub struct IndexScanPlan {
    pub table_oid: TableOid,
    pub index_name: String,
}

#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub table_oid: TableOid,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct DeletePlan {
    pub table_oid: TableOid,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct NestedLoopJoinPlan {
    pub join_type: JoinType,
    pub predicate: Expression,
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct NestedIndexJoinPlan {
    pub join_type: JoinType,
    pub inner_table_oid: TableOid,
    pub index_name: String,
    /// Evaluated against each outer tuple to produce the probe key.
    pub key_expression: Expression,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct SortPlan {
    pub order_by: Vec<OrderBy>,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct TopNPlan {
    pub order_by: Vec<OrderBy>,
    pub n: usize,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct LimitPlan {
    pub limit: usize,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct ValuesPlan {
    pub schema: Schema,
    pub rows: Vec<Vec<DataValue>>,
}
