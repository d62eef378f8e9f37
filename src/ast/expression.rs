use crate::ast::aggregation::TimeUnit;
use crate::core::types::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

/// Either a literal or a `now ± quantity unit` expression, resolved against a clock
/// at plan time so the same statement re-plans identically at any instant it's given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComparisonValue {
    Absolute(Value),
    Relative { sign: i8, quantity: i64, unit: TimeUnit },
}

impl ComparisonValue {
    pub fn resolve(&self, now_millis: i64) -> Value {
        match self {
            ComparisonValue::Absolute(v) => v.clone(),
            ComparisonValue::Relative { sign, quantity, unit } => {
                let offset = (*sign as i64) * quantity * unit.millis();
                Value::Int(now_millis + offset)
            }
        }
    }
}

/// A condition over a record's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Equality(String, Value),
    Comparison(String, ComparisonOp, ComparisonValue),
    /// Inclusive [from, to] range.
    Range(String, ComparisonValue, ComparisonValue),
    /// `$` and `%` both mean "zero or more of any character".
    Like(String, String),
    Nullable(String),
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn and(self, other: Expression) -> Expression {
        Expression::And(Box::new(self), Box::new(other))
    }

    pub fn not_nullable(field: impl Into<String>) -> Expression {
        Expression::Not(Box::new(Expression::Nullable(field.into())))
    }

    /// True if the field this expression targets (root-level only, ignoring And/Or/Not
    /// composition) is `field`. Used by `enrich_with_time_range`/`time_ordering`.
    pub fn targets(&self, field: &str) -> bool {
        match self {
            Expression::Equality(f, _) => f == field,
            Expression::Comparison(f, _, _) => f == field,
            Expression::Range(f, _, _) => f == field,
            Expression::Like(f, _) => f == field,
            Expression::Nullable(f) => f == field,
            Expression::Not(inner) => inner.targets(field),
            Expression::And(a, b) | Expression::Or(a, b) => a.targets(field) || b.targets(field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_value_resolves_against_clock() {
        let cv = ComparisonValue::Relative {
            sign: -1,
            quantity: 100,
            unit: TimeUnit::Second,
        };
        assert_eq!(cv.resolve(1000), Value::Int(1000 - 100_000));
    }

    #[test]
    fn and_combination_targets_both_sides() {
        let expr = Expression::Equality("name".into(), Value::String("A".into()))
            .and(Expression::Range(
                "timestamp".into(),
                ComparisonValue::Absolute(Value::Int(0)),
                ComparisonValue::Absolute(Value::Int(10)),
            ));
        assert!(expr.targets("name"));
        assert!(expr.targets("timestamp"));
        assert!(!expr.targets("city"));
    }
}
