use crate::query::plan::{LimitPlan, PlanNode, SortPlan, TopNPlan};

/// Rewrite `Limit(Sort(X))` into `TopN(X)`, bottom-up over the whole
/// plan. TopN keeps a bounded heap instead of materializing and sorting
/// the entire child.
pub fn sort_limit_as_topn(plan: PlanNode) -> PlanNode {
    let plan = map_children(plan, sort_limit_as_topn);

    match plan {
        PlanNode::Limit(LimitPlan { limit, child }) => match *child {
            PlanNode::Sort(SortPlan { order_by, child: sort_child }) => {
                PlanNode::TopN(TopNPlan { order_by, n: limit, child: sort_child })
            }
            other => PlanNode::Limit(LimitPlan { limit, child: Box::new(other) }),
        },
        other => other,
    }
}

fn map_children(plan: PlanNode, f: fn(PlanNode) -> PlanNode) -> PlanNode {
    match plan {
        PlanNode::Insert(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Insert(p)
        }
        PlanNode::Delete(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Delete(p)
        }
        PlanNode::NestedLoopJoin(mut p) => {
            p.left = Box::new(f(*p.left));
            p.right = Box::new(f(*p.right));
            PlanNode::NestedLoopJoin(p)
        }
        PlanNode::NestedIndexJoin(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::NestedIndexJoin(p)
        }
        PlanNode::Sort(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Sort(p)
        }
        PlanNode::TopN(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::TopN(p)
        }
        PlanNode::Limit(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Limit(p)
        }
        leaf @ (PlanNode::SeqScan(_)
        | PlanNode::IndexScan(_)
        | PlanNode::Values(_)) => leaf,
    }
}
