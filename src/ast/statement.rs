use crate::ast::aggregation::{Aggregation, GroupBy};
use crate::ast::expression::{ComparisonValue, Expression};
use crate::core::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

/// A single projected field, optionally wrapped in an aggregation (`sum(value)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedField {
    pub name: String,
    pub aggregation: Option<Aggregation>,
}

impl SelectedField {
    pub fn plain(name: impl Into<String>) -> Self {
        SelectedField {
            name: name.into(),
            aggregation: None,
        }
    }

    pub fn aggregated(name: impl Into<String>, aggregation: Aggregation) -> Self {
        SelectedField {
            name: name.into(),
            aggregation: Some(aggregation),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    AllFields,
    ListFields(Vec<SelectedField>),
}

impl Projection {
    pub fn has_aggregation(&self) -> bool {
        match self {
            Projection::AllFields => false,
            Projection::ListFields(fields) => fields.iter().any(|f| f.aggregation.is_some()),
        }
    }
}

/// A simple equality/comparison filter, as built from a flat field/value/op triple list
/// (the shape client code typically has on hand before it builds a full [`Expression`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimpleOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    pub db: String,
    pub namespace: String,
    pub metric: String,
    pub distinct: bool,
    pub fields: Projection,
    pub condition: Option<Expression>,
    pub group_by: Option<GroupBy>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl SelectStatement {
    pub fn new(metric: impl Into<String>) -> Self {
        SelectStatement {
            db: String::new(),
            namespace: String::new(),
            metric: metric.into(),
            distinct: false,
            fields: Projection::AllFields,
            condition: None,
            group_by: None,
            order: None,
            limit: None,
        }
    }

    pub fn with_context(mut self, db: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.db = db.into();
        self.namespace = namespace.into();
        self
    }

    /// AND-combines an inclusive Range on `field` with the existing condition.
    pub fn enrich_with_time_range(&mut self, field: &str, from: i64, to: i64) {
        let range = Expression::Range(
            field.to_string(),
            ComparisonValue::Absolute(Value::Int(from)),
            ComparisonValue::Absolute(Value::Int(to)),
        );
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(range),
            None => range,
        });
    }

    /// Reduces a list of simple filters into a left-folded And, combined with the
    /// existing condition.
    pub fn add_conditions(&mut self, conditions: Vec<(String, Option<Value>, SimpleOp)>) {
        let mut folded: Option<Expression> = None;
        for (field, value, op) in conditions {
            let expr = match (op, value) {
                (SimpleOp::Eq, Some(v)) => Expression::Equality(field, v),
                (SimpleOp::Lt, Some(v)) => Expression::Comparison(
                    field,
                    crate::ast::expression::ComparisonOp::Lt,
                    ComparisonValue::Absolute(v),
                ),
                (SimpleOp::Lte, Some(v)) => Expression::Comparison(
                    field,
                    crate::ast::expression::ComparisonOp::Lte,
                    ComparisonValue::Absolute(v),
                ),
                (SimpleOp::Gt, Some(v)) => Expression::Comparison(
                    field,
                    crate::ast::expression::ComparisonOp::Gt,
                    ComparisonValue::Absolute(v),
                ),
                (SimpleOp::Gte, Some(v)) => Expression::Comparison(
                    field,
                    crate::ast::expression::ComparisonOp::Gte,
                    ComparisonValue::Absolute(v),
                ),
                (_, None) => Expression::Nullable(field),
            };
            folded = Some(match folded {
                Some(acc) => acc.and(expr),
                None => expr,
            });
        }
        if let Some(extra) = folded {
            self.condition = Some(match self.condition.take() {
                Some(existing) => existing.and(extra),
                None => extra,
            });
        }
    }

    /// Yields the statement's sort order iff ORDER BY targets the timestamp field.
    pub fn time_ordering(&self) -> Option<SortOrder> {
        self.order.as_ref().and_then(|o| {
            if o.field == "timestamp" {
                Some(o.order)
            } else {
                None
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertStatement {
    pub db: String,
    pub namespace: String,
    pub metric: String,
    pub timestamp: Option<i64>,
    pub dimensions: BTreeMap<String, Value>,
    pub tags: BTreeMap<String, Value>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteStatement {
    pub db: String,
    pub namespace: String,
    pub metric: String,
    pub condition: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropStatement {
    pub db: String,
    pub namespace: String,
    pub metric: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Delete(DeleteStatement),
    Drop(DropStatement),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expression::ComparisonOp;

    #[test]
    fn time_ordering_is_none_for_non_timestamp_order() {
        let mut stmt = SelectStatement::new("people");
        stmt.order = Some(OrderBy {
            field: "name".into(),
            order: SortOrder::Asc,
        });
        assert_eq!(stmt.time_ordering(), None);

        stmt.order = Some(OrderBy {
            field: "timestamp".into(),
            order: SortOrder::Desc,
        });
        assert_eq!(stmt.time_ordering(), Some(SortOrder::Desc));
    }

    #[test]
    fn enrich_with_time_range_ands_with_existing_condition() {
        let mut stmt = SelectStatement::new("people");
        stmt.condition = Some(Expression::Equality(
            "name".into(),
            Value::String("A".into()),
        ));
        stmt.enrich_with_time_range("timestamp", 10, 20);
        match stmt.condition {
            Some(Expression::And(a, b)) => {
                assert!(matches!(*a, Expression::Equality(_, _)));
                assert!(matches!(*b, Expression::Range(_, _, _)));
            }
            _ => panic!("expected And"),
        }
    }

    #[test]
    fn add_conditions_folds_left_to_right() {
        let mut stmt = SelectStatement::new("people");
        stmt.add_conditions(vec![
            ("city".into(), Some(Value::String("X".into())), SimpleOp::Eq),
            ("value".into(), Some(Value::Int(5)), SimpleOp::Gt),
        ]);
        match stmt.condition {
            Some(Expression::And(a, b)) => {
                assert!(matches!(*a, Expression::Equality(_, _)));
                assert!(matches!(
                    *b,
                    Expression::Comparison(_, ComparisonOp::Gt, _)
                ));
            }
            _ => panic!("expected And"),
        }
    }
}
