use crate::query::executor::result::{DataValue, Tuple};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Minimal expression form: enough to express scan predicates, join
/// conditions, probe keys and sort keys.
#[derive(Debug, Clone)]
pub enum Expression {
    Literal(DataValue),
    /// Column of the current tuple.
    Column(usize),
    /// Column of one side of a join.
    JoinColumn { side: JoinSide, index: usize },
    Compare { op: CompareOp, left: Box<Expression>, right: Box<Expression> },
}

impl Expression {
    pub fn column(index: usize) -> Self {
        Expression::Column(index)
    }

    pub fn literal(value: DataValue) -> Self {
        Expression::Literal(value)
    }

    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Expression::Compare { op, left: Box::new(left), right: Box::new(right) }
    }

    /// Evaluate against a single tuple. Join columns are out of scope
    /// here and evaluate to NULL.
    pub fn evaluate(&self, tuple: &Tuple) -> DataValue {
        match self {
            Expression::Literal(value) => value.clone(),
            Expression::Column(index) => tuple.value(*index).cloned().unwrap_or(DataValue::Null),
            Expression::JoinColumn { .. } => DataValue::Null,
            Expression::Compare { op, left, right } => {
                compare_values(*op, &left.evaluate(tuple), &right.evaluate(tuple))
            }
        }
    }

    /// Evaluate against a pair of join inputs.
    pub fn evaluate_join(&self, left_tuple: &Tuple, right_tuple: &Tuple) -> DataValue {
        match self {
            Expression::Literal(value) => value.clone(),
            Expression::Column(index) => {
                left_tuple.value(*index).cloned().unwrap_or(DataValue::Null)
            }
            Expression::JoinColumn { side, index } => {
                let tuple = match side {
                    JoinSide::Left => left_tuple,
                    JoinSide::Right => right_tuple,
                };
                tuple.value(*index).cloned().unwrap_or(DataValue::Null)
            }
            Expression::Compare { op, left, right } => compare_values(
                *op,
                &left.evaluate_join(left_tuple, right_tuple),
                &right.evaluate_join(left_tuple, right_tuple),
            ),
        }
    }
}

/// Three-valued comparison: NULL operands yield NULL.
fn compare_values(op: CompareOp, left: &DataValue, right: &DataValue) -> DataValue {
    if matches!(left, DataValue::Null) || matches!(right, DataValue::Null) {
        return DataValue::Null;
    }
    let ordering = match left.partial_cmp(right) {
        Some(ordering) => ordering,
        None => return DataValue::Null,
    };
    let result = match op {
        CompareOp::Eq => ordering.is_eq(),
        CompareOp::NotEq => !ordering.is_eq(),
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::LtEq => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::GtEq => ordering.is_ge(),
    };
    DataValue::Boolean(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_and_literal() {
        let tuple = Tuple::new(vec![DataValue::Integer(7), DataValue::Text("x".into())]);
        assert_eq!(Expression::column(0).evaluate(&tuple), DataValue::Integer(7));
        assert_eq!(Expression::column(9).evaluate(&tuple), DataValue::Null);
        assert_eq!(
            Expression::literal(DataValue::Boolean(true)).evaluate(&tuple),
            DataValue::Boolean(true)
        );
    }

    #[test]
    fn test_compare_three_valued() {
        let tuple = Tuple::new(vec![DataValue::Integer(5), DataValue::Null]);
        let lt = Expression::compare(
            CompareOp::Lt,
            Expression::column(0),
            Expression::literal(DataValue::Integer(10)),
        );
        assert_eq!(lt.evaluate(&tuple), DataValue::Boolean(true));

        let vs_null = Expression::compare(CompareOp::Eq, Expression::column(0), Expression::column(1));
        assert_eq!(vs_null.evaluate(&tuple), DataValue::Null);
    }

    #[test]
    fn test_join_columns() {
        let left = Tuple::new(vec![DataValue::Integer(1)]);
        let right = Tuple::new(vec![DataValue::Integer(1), DataValue::Integer(2)]);
        let eq = Expression::compare(
            CompareOp::Eq,
            Expression::JoinColumn { side: JoinSide::Left, index: 0 },
            Expression::JoinColumn { side: JoinSide::Right, index: 0 },
        );
        assert_eq!(eq.evaluate_join(&left, &right), DataValue::Boolean(true));

        let neq = Expression::compare(
            CompareOp::Eq,
            Expression::JoinColumn { side: JoinSide::Left, index: 0 },
            Expression::JoinColumn { side: JoinSide::Right, index: 1 },
        );
        assert_eq!(neq.evaluate_join(&left, &right), DataValue::Boolean(false));
    }
}
