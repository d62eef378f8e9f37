use crate::ast::aggregation::{Aggregation, GroupBy};
use crate::ast::expression::{ComparisonOp, ComparisonValue, Expression};
use crate::ast::statement::{OrderBy, Projection, SelectStatement, SortOrder};
use crate::core::error::Error;
use crate::index::query::IndexQuery;
use crate::schema::registry::{FieldKind, Schema, ValueType};

/// What the caller asked to get back: every stored field, or a specific list
/// (each optionally wrapped in an aggregation).
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionPlan {
    AllFields,
    ListFields(Vec<(String, Option<Aggregation>)>),
}

/// The lowered, planner-produced representation executed against a location's index.
#[derive(Debug, Clone)]
pub struct PhysicalQuery {
    pub backing: IndexQuery,
    pub projection: ProjectionPlan,
    pub sort: Option<OrderBy>,
    pub limit: Option<usize>,
    pub group_by: Option<GroupBy>,
    /// Deduplicate projected rows (`SELECT DISTINCT`); applied after projection,
    /// before the global limit, since two distinct records can project to the same row.
    pub distinct: bool,
}

impl PhysicalQuery {
    pub fn is_aggregated(&self) -> bool {
        self.group_by.is_some() || matches!(&self.projection, ProjectionPlan::ListFields(fs) if fs.iter().any(|(_, a)| a.is_some()))
    }
}

fn field_kind<'a>(schema: &'a Schema, field: &str) -> Option<&'a FieldKind> {
    if field == "timestamp" {
        return Some(&FieldKind::Timestamp);
    }
    schema.fields.get(field)
}

fn is_string_field(schema: &Schema, field: &str) -> bool {
    matches!(
        field_kind(schema, field),
        Some(FieldKind::Dimension(ValueType::String)) | Some(FieldKind::Tag(ValueType::String))
    )
}

fn is_numeric_field(schema: &Schema, field: &str) -> bool {
    match field_kind(schema, field) {
        Some(FieldKind::Timestamp) => true,
        Some(FieldKind::Value(t)) | Some(FieldKind::Dimension(t)) | Some(FieldKind::Tag(t)) => {
            !matches!(t, ValueType::String)
        }
        None => false,
    }
}

fn is_tag_field(schema: &Schema, field: &str) -> bool {
    matches!(field_kind(schema, field), Some(FieldKind::Tag(_)))
}

fn lower_comparison_value(cv: &ComparisonValue, now_millis: i64) -> crate::core::types::Value {
    cv.resolve(now_millis)
}

fn lower_expression(expr: &Expression, schema: &Schema, now_millis: i64) -> Result<IndexQuery, Error> {
    match expr {
        Expression::Equality(field, value) => {
            if field_kind(schema, field).is_none() {
                return Err(Error::PlanError {
                    message: format!("unknown field: {field}"),
                });
            }
            Ok(IndexQuery::Term {
                field: field.clone(),
                value: value.clone(),
            })
        }
        Expression::Comparison(field, op, cv) => {
            if !is_numeric_field(schema, field) {
                return Err(Error::PlanError {
                    message: format!("comparison on non-numeric field: {field}"),
                });
            }
            let v = lower_comparison_value(cv, now_millis);
            let query = match op {
                ComparisonOp::Gt => IndexQuery::Range {
                    field: field.clone(),
                    from: Some(v),
                    from_inclusive: false,
                    to: None,
                    to_inclusive: true,
                },
                ComparisonOp::Gte => IndexQuery::Range {
                    field: field.clone(),
                    from: Some(v),
                    from_inclusive: true,
                    to: None,
                    to_inclusive: true,
                },
                ComparisonOp::Lt => IndexQuery::Range {
                    field: field.clone(),
                    from: None,
                    from_inclusive: true,
                    to: Some(v),
                    to_inclusive: false,
                },
                ComparisonOp::Lte => IndexQuery::Range {
                    field: field.clone(),
                    from: None,
                    from_inclusive: true,
                    to: Some(v),
                    to_inclusive: true,
                },
            };
            Ok(query)
        }
        Expression::Range(field, from, to) => {
            if field != "timestamp" && !is_numeric_field(schema, field) {
                return Err(Error::PlanError {
                    message: format!("range on non-numeric field: {field}"),
                });
            }
            Ok(IndexQuery::Range {
                field: field.clone(),
                from: Some(lower_comparison_value(from, now_millis)),
                from_inclusive: true,
                to: Some(lower_comparison_value(to, now_millis)),
                to_inclusive: true,
            })
        }
        Expression::Like(field, pattern) => {
            if !is_string_field(schema, field) {
                return Err(Error::PlanError {
                    message: format!("LIKE on non-string field: {field}"),
                });
            }
            Ok(IndexQuery::Wildcard {
                field: field.clone(),
                pattern: pattern.clone(),
            })
        }
        Expression::Nullable(field) => {
            if field_kind(schema, field).is_none() {
                return Err(Error::PlanError {
                    message: format!("unknown field: {field}"),
                });
            }
            Ok(IndexQuery::Not(Box::new(IndexQuery::Exists {
                field: field.clone(),
            })))
        }
        Expression::Not(inner) => {
            Ok(IndexQuery::Not(Box::new(lower_expression(inner, schema, now_millis)?)))
        }
        Expression::And(a, b) => Ok(IndexQuery::And(vec![
            lower_expression(a, schema, now_millis)?,
            lower_expression(b, schema, now_millis)?,
        ])),
        Expression::Or(a, b) => Ok(IndexQuery::Or(vec![
            lower_expression(a, schema, now_millis)?,
            lower_expression(b, schema, now_millis)?,
        ])),
    }
}

/// Lowers a bare condition (used by DELETE and `get_count`, which have no projection,
/// sort, limit or group-by to plan) into a backing [`IndexQuery`].
pub fn plan_backing_query(
    condition: &Expression,
    schema: &Schema,
    now_millis: i64,
) -> Result<IndexQuery, Error> {
    lower_expression(condition, schema, now_millis)
}

/// Lowers a SelectStatement plus its metric's schema into a PhysicalQuery.
/// `now_millis` resolves relative-time literals; `default_limit` is applied to
/// unbounded non-aggregated queries.
pub fn plan_select(
    stmt: &SelectStatement,
    schema: &Schema,
    now_millis: i64,
    default_limit: usize,
) -> Result<PhysicalQuery, Error> {
    let backing = match &stmt.condition {
        Some(expr) => lower_expression(expr, schema, now_millis)?,
        None => IndexQuery::MatchAll,
    };

    let projection = match &stmt.fields {
        Projection::AllFields => {
            if stmt.group_by.is_some() {
                return Err(Error::PlanError {
                    message: "SELECT * is not permitted with GROUP BY".to_string(),
                });
            }
            ProjectionPlan::AllFields
        }
        Projection::ListFields(fields) => {
            let has_aggregation = fields.iter().any(|f| f.aggregation.is_some());
            let has_plain = fields.iter().any(|f| f.aggregation.is_none());
            if has_aggregation && has_plain {
                return Err(Error::PlanError {
                    message: "cannot mix aggregated and non-aggregated fields".to_string(),
                });
            }
            for f in fields {
                if let Some(agg) = f.aggregation {
                    if agg.requires_numeric_field() && f.name != "*" && !is_numeric_field(schema, &f.name) {
                        return Err(Error::PlanError {
                            message: format!("aggregation on non-numeric field: {}", f.name),
                        });
                    }
                    if stmt.group_by.is_none() && !agg.is_global() {
                        return Err(Error::PlanError {
                            message: format!("{agg:?} requires GROUP BY"),
                        });
                    }
                } else if field_kind(schema, &f.name).is_none() {
                    return Err(Error::PlanError {
                        message: format!("unknown field: {}", f.name),
                    });
                }
            }
            ProjectionPlan::ListFields(
                fields
                    .iter()
                    .map(|f| (f.name.clone(), f.aggregation))
                    .collect(),
            )
        }
    };

    if let Some(GroupBy::Simple(tag)) = &stmt.group_by {
        if !is_tag_field(schema, tag) {
            return Err(Error::PlanError {
                message: format!("GROUP BY on non-tag field: {tag}"),
            });
        }
    }

    let limit = match stmt.limit {
        Some(n) => Some(n),
        None if !projection.has_aggregation_plan() => Some(default_limit),
        None => None,
    };

    Ok(PhysicalQuery {
        backing,
        projection,
        sort: stmt.order.clone(),
        limit,
        group_by: stmt.group_by.clone(),
        distinct: stmt.distinct,
    })
}

impl ProjectionPlan {
    fn has_aggregation_plan(&self) -> bool {
        match self {
            ProjectionPlan::AllFields => false,
            ProjectionPlan::ListFields(fs) => fs.iter().any(|(_, a)| a.is_some()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::statement::{SelectedField, SimpleOp};
    use crate::core::types::{Record, Value};
    use crate::schema::registry::SchemaRegistry;

    fn schema_for_people() -> Schema {
        let mut registry = SchemaRegistry::new();
        registry
            .update_from_record(
                "people",
                &Record::new(0, Value::Int(1))
                    .with_dimension("name", Value::String("A".into()))
                    .with_tag("city", Value::String("X".into())),
            )
            .unwrap();
        registry.get("people").cloned().unwrap()
    }

    #[test]
    fn select_star_with_group_by_is_a_plan_error() {
        let schema = schema_for_people();
        let mut stmt = SelectStatement::new("people");
        stmt.group_by = Some(GroupBy::Simple("city".into()));
        let err = plan_select(&stmt, &schema, 0, 1000).unwrap_err();
        assert!(matches!(err, Error::PlanError { .. }));
    }

    #[test]
    fn like_on_non_string_field_is_a_plan_error() {
        let schema = schema_for_people();
        let mut stmt = SelectStatement::new("people");
        stmt.condition = Some(Expression::Like("value".into(), "%x".into()));
        let err = plan_select(&stmt, &schema, 0, 1000).unwrap_err();
        assert!(matches!(err, Error::PlanError { .. }));
    }

    #[test]
    fn group_by_non_tag_field_is_a_plan_error() {
        let schema = schema_for_people();
        let mut stmt = SelectStatement::new("people");
        stmt.group_by = Some(GroupBy::Simple("name".into()));
        stmt.fields = Projection::ListFields(vec![SelectedField::aggregated(
            "value",
            Aggregation::Sum,
        )]);
        let err = plan_select(&stmt, &schema, 0, 1000).unwrap_err();
        assert!(matches!(err, Error::PlanError { .. }));
    }

    #[test]
    fn relative_time_planning_is_idempotent() {
        let schema = schema_for_people();
        let mut stmt = SelectStatement::new("people");
        stmt.add_conditions(vec![(
            "timestamp".into(),
            Some(Value::Int(0)),
            SimpleOp::Gte,
        )]);
        let first = plan_select(&stmt, &schema, 1000, 1000).unwrap();
        let second = plan_select(&stmt, &schema, 1000, 1000).unwrap();
        assert_eq!(format!("{:?}", first.backing), format!("{:?}", second.backing));
    }

    #[test]
    fn strict_comparison_lowers_to_an_exclusive_bound() {
        let schema = schema_for_people();
        let mut gt_stmt = SelectStatement::new("people");
        gt_stmt.condition = Some(Expression::Comparison(
            "value".into(),
            ComparisonOp::Gt,
            ComparisonValue::Absolute(Value::Int(5)),
        ));
        let gt = plan_select(&gt_stmt, &schema, 0, 1000).unwrap();
        match gt.backing {
            IndexQuery::Range {
                from_inclusive,
                to_inclusive,
                ..
            } => {
                assert!(!from_inclusive);
                assert!(to_inclusive);
            }
            other => panic!("expected Range, got {other:?}"),
        }

        let mut gte_stmt = SelectStatement::new("people");
        gte_stmt.condition = Some(Expression::Comparison(
            "value".into(),
            ComparisonOp::Gte,
            ComparisonValue::Absolute(Value::Int(5)),
        ));
        let gte = plan_select(&gte_stmt, &schema, 0, 1000).unwrap();
        match gte.backing {
            IndexQuery::Range { from_inclusive, .. } => assert!(from_inclusive),
            other => panic!("expected Range, got {other:?}"),
        }
    }

    #[test]
    fn default_limit_applies_only_without_aggregation() {
        let schema = schema_for_people();
        let stmt = SelectStatement::new("people");
        let plan = plan_select(&stmt, &schema, 0, 500).unwrap();
        assert_eq!(plan.limit, Some(500));
    }
}
