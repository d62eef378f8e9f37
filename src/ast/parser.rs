use crate::ast::aggregation::{Aggregation, GroupBy, TimeUnit};
use crate::ast::expression::{ComparisonOp, ComparisonValue, Expression};
use crate::ast::statement::{
    DeleteStatement, DropStatement, InsertStatement, OrderBy, Projection, SelectStatement,
    SelectedField, SortOrder, Statement,
};
use crate::core::error::Error;
use crate::core::types::Value;
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while, take_while1};
use nom::character::complete::{char, digit1, multispace0, multispace1};
use nom::combinator::{map, opt, recognize, value};
use nom::multi::{many0, separated_list1};
use nom::Parser;
use std::collections::BTreeMap;

type PResult<'a, T> = nom::IResult<&'a str, T>;

fn ws(input: &str) -> PResult<'_, ()> {
    map(multispace0, |_| ()).parse(input)
}

fn ws1(input: &str) -> PResult<'_, ()> {
    map(multispace1, |_| ()).parse(input)
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn identifier(input: &str) -> PResult<'_, String> {
    map(
        recognize((
            take_while1(|c: char| c.is_alphabetic() || c == '_'),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        )),
        |s: &str| s.to_string(),
    )
    .parse(input)
}

fn signed_integer(input: &str) -> PResult<'_, i64> {
    map(recognize((opt(char('-')), digit1)), |s: &str| {
        s.parse::<i64>().unwrap_or(0)
    })
    .parse(input)
}

fn number_literal(input: &str) -> PResult<'_, Value> {
    let (rest, sign) = opt(char('-')).parse(input)?;
    let (rest, int_part) = digit1.parse(rest)?;
    let (rest, frac) = opt((char('.'), digit1)).parse(rest)?;
    let text = match &frac {
        Some((_, f)) => format!("{}{}.{}", sign.map(|_| "-").unwrap_or(""), int_part, f),
        None => format!("{}{}", sign.map(|_| "-").unwrap_or(""), int_part),
    };
    let value = match frac {
        Some(_) => Value::Float(text.parse::<f64>().unwrap_or(0.0)),
        None => Value::Int(text.parse::<i64>().unwrap_or(0)),
    };
    Ok((rest, value))
}

fn quoted_string(input: &str) -> PResult<'_, String> {
    let (rest, _) = char('\'').parse(input)?;
    let (rest, body) = take_while(|c: char| c != '\'').parse(rest)?;
    let (rest, _) = char('\'').parse(rest)?;
    Ok((rest, body.to_string()))
}

fn value_literal(input: &str) -> PResult<'_, Value> {
    alt((map(quoted_string, Value::String), number_literal)).parse(input)
}

fn time_unit(input: &str) -> PResult<'_, TimeUnit> {
    alt((
        value(TimeUnit::Millis, tag_no_case("ms")),
        value(TimeUnit::Millis, tag_no_case("millis")),
        value(TimeUnit::Second, tag_no_case("second")),
        value(TimeUnit::Second, tag_no_case("sec")),
        value(TimeUnit::Second, tag_no_case("s")),
        value(TimeUnit::Minute, tag_no_case("minute")),
        value(TimeUnit::Minute, tag_no_case("min")),
        value(TimeUnit::Hour, tag_no_case("hour")),
        value(TimeUnit::Hour, tag_no_case("h")),
        value(TimeUnit::Day, tag_no_case("day")),
        value(TimeUnit::Day, tag_no_case("d")),
    ))
    .parse(input)
}

/// `now [+-] q unit`
fn relative_time(input: &str) -> PResult<'_, ComparisonValue> {
    let (rest, _) = tag_no_case("now").parse(input)?;
    let (rest, _) = ws.parse(rest)?;
    let (rest, sign_char) = alt((char('+'), char('-'))).parse(rest)?;
    let (rest, _) = ws.parse(rest)?;
    let (rest, quantity) = signed_integer.parse(rest)?;
    let (rest, _) = ws1.parse(rest)?;
    let (rest, unit) = time_unit.parse(rest)?;
    let sign: i8 = if sign_char == '+' { 1 } else { -1 };
    Ok((rest, ComparisonValue::Relative { sign, quantity, unit }))
}

fn comparison_value(input: &str) -> PResult<'_, ComparisonValue> {
    alt((
        relative_time,
        map(value_literal, ComparisonValue::Absolute),
    ))
    .parse(input)
}

fn comparison_op(input: &str) -> PResult<'_, ComparisonOp> {
    alt((
        value(ComparisonOp::Lte, tag("<=")),
        value(ComparisonOp::Gte, tag(">=")),
        value(ComparisonOp::Lt, tag("<")),
        value(ComparisonOp::Gt, tag(">")),
    ))
    .parse(input)
}

/// A primary predicate: comparison, equality, LIKE, ISNULL/ISNOTNULL, BETWEEN, or a
/// parenthesized sub-expression.
fn primary_expr(input: &str) -> PResult<'_, Expression> {
    let (rest, _) = ws.parse(input)?;
    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('(').parse(rest) {
        let (rest, _) = ws.parse(rest)?;
        let (rest, inner) = or_expr(rest)?;
        let (rest, _) = ws.parse(rest)?;
        let (rest, _) = char(')').parse(rest)?;
        return Ok((rest, inner));
    }
    if let Ok((after_not, _)) = tag_no_case::<&str, &str, nom::error::Error<&str>>("NOT").parse(rest)
    {
        // Only commit to the NOT keyword at a word boundary, so a field name that
        // merely starts with "not" (e.g. `note`) falls through to the identifier
        // branch below instead of aborting the parse.
        let is_word_boundary = after_not
            .chars()
            .next()
            .map(|c| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(true);
        if is_word_boundary {
            let (rest, _) = ws1.parse(after_not)?;
            let (rest, inner) = primary_expr(rest)?;
            return Ok((rest, Expression::Not(Box::new(inner))));
        }
    }

    let (rest, field) = identifier.parse(rest)?;
    let (rest, _) = ws.parse(rest)?;

    if let Ok((rest, _)) = tag_no_case::<&str, &str, nom::error::Error<&str>>("ISNOTNULL")
        .parse(rest)
    {
        return Ok((rest, Expression::Not(Box::new(Expression::Nullable(field)))));
    }
    if let Ok((rest, _)) = tag_no_case::<&str, &str, nom::error::Error<&str>>("ISNULL")
        .parse(rest)
    {
        return Ok((rest, Expression::Nullable(field)));
    }
    if let Ok((rest, _)) = tag_no_case::<&str, &str, nom::error::Error<&str>>("BETWEEN")
        .parse(rest)
    {
        let (rest, _) = ws1.parse(rest)?;
        let (rest, from) = comparison_value.parse(rest)?;
        let (rest, _) = ws1.parse(rest)?;
        let (rest, _) = tag_no_case("AND").parse(rest)?;
        let (rest, _) = ws1.parse(rest)?;
        let (rest, to) = comparison_value.parse(rest)?;
        return Ok((rest, Expression::Range(field, from, to)));
    }
    if let Ok((rest, _)) = tag_no_case::<&str, &str, nom::error::Error<&str>>("LIKE").parse(rest) {
        let (rest, _) = ws1.parse(rest)?;
        let (rest, pattern) = quoted_string.parse(rest)?;
        return Ok((rest, Expression::Like(field, pattern)));
    }
    if let Ok((rest, op)) = comparison_op.parse(rest) {
        let (rest, _) = ws.parse(rest)?;
        let (rest, val) = comparison_value.parse(rest)?;
        return Ok((rest, Expression::Comparison(field, op, val)));
    }
    let (rest, _) = char('=').parse(rest)?;
    let (rest, _) = ws.parse(rest)?;
    let (rest, val) = value_literal.parse(rest)?;
    Ok((rest, Expression::Equality(field, val)))
}

fn and_expr(input: &str) -> PResult<'_, Expression> {
    let (rest, first) = primary_expr(input)?;
    let (rest, tail) = many0((ws1, tag_no_case("AND"), ws1, primary_expr)).parse(rest)?;
    let expr = tail
        .into_iter()
        .fold(first, |acc, (_, _, _, next)| acc.and(next));
    Ok((rest, expr))
}

fn or_expr(input: &str) -> PResult<'_, Expression> {
    let (rest, first) = and_expr(input)?;
    let (rest, tail) = many0((ws1, tag_no_case("OR"), ws1, and_expr)).parse(rest)?;
    let expr = tail.into_iter().fold(first, |acc, (_, _, _, next)| {
        Expression::Or(Box::new(acc), Box::new(next))
    });
    Ok((rest, expr))
}

fn aggregation_name(input: &str) -> PResult<'_, Aggregation> {
    alt((
        value(Aggregation::Count, tag_no_case("count")),
        value(Aggregation::Sum, tag_no_case("sum")),
        value(Aggregation::Min, tag_no_case("min")),
        value(Aggregation::Max, tag_no_case("max")),
        value(Aggregation::First, tag_no_case("first")),
        value(Aggregation::Last, tag_no_case("last")),
        value(Aggregation::Avg, tag_no_case("avg")),
    ))
    .parse(input)
}

fn selected_field(input: &str) -> PResult<'_, SelectedField> {
    let (rest, agg) = opt(aggregation_name).parse(input)?;
    if let Some(agg) = agg {
        let (rest, _) = char('(').parse(rest)?;
        let (rest, name) = alt((map(char('*'), |_| "*".to_string()), identifier)).parse(rest)?;
        let (rest, _) = char(')').parse(rest)?;
        return Ok((rest, SelectedField::aggregated(name, agg)));
    }
    map(identifier, SelectedField::plain).parse(rest)
}

fn projection(input: &str) -> PResult<'_, Projection> {
    alt((
        value(Projection::AllFields, char('*')),
        map(separated_list1((char(','), ws), selected_field), |fields| {
            Projection::ListFields(fields)
        }),
    ))
    .parse(input)
}

fn group_by(input: &str) -> PResult<'_, GroupBy> {
    if let Ok((rest, _)) = tag_no_case::<&str, &str, nom::error::Error<&str>>("interval")
        .parse(input)
    {
        let (rest, _) = ws1.parse(rest)?;
        let (rest, quantity) = signed_integer.parse(rest)?;
        let (rest, unit) = time_unit.parse(rest)?;
        return Ok((rest, GroupBy::temporal(quantity, unit)));
    }
    map(identifier, GroupBy::Simple).parse(input)
}

fn select_statement(input: &str) -> PResult<'_, SelectStatement> {
    let (rest, _) = tag_no_case("SELECT").parse(input)?;
    let (rest, _) = ws1.parse(rest)?;
    let (rest, distinct) = opt((tag_no_case("DISTINCT"), ws1)).parse(rest)?;
    let (rest, fields) = projection.parse(rest)?;
    let (rest, _) = ws1.parse(rest)?;
    let (rest, _) = tag_no_case("FROM").parse(rest)?;
    let (rest, _) = ws1.parse(rest)?;
    let (rest, metric) = identifier.parse(rest)?;
    let (rest, _) = ws.parse(rest)?;

    let (rest, condition) = opt(|i| {
        let (i, _) = tag_no_case("WHERE").parse(i)?;
        let (i, _) = ws1.parse(i)?;
        or_expr(i)
    })
    .parse(rest)?;
    let (rest, _) = ws.parse(rest)?;

    let (rest, group) = opt(|i| {
        let (i, _) = tag_no_case("GROUP").parse(i)?;
        let (i, _) = ws1.parse(i)?;
        let (i, _) = tag_no_case("BY").parse(i)?;
        let (i, _) = ws1.parse(i)?;
        group_by(i)
    })
    .parse(rest)?;
    let (rest, _) = ws.parse(rest)?;

    let (rest, order) = opt(|i| {
        let (i, _) = tag_no_case("ORDER").parse(i)?;
        let (i, _) = ws1.parse(i)?;
        let (i, _) = tag_no_case("BY").parse(i)?;
        let (i, _) = ws1.parse(i)?;
        let (i, field) = identifier.parse(i)?;
        let (i, _) = ws1.parse(i)?;
        let (i, order) = alt((
            value(SortOrder::Asc, tag_no_case("ASC")),
            value(SortOrder::Desc, tag_no_case("DESC")),
        ))
        .parse(i)?;
        Ok((i, OrderBy { field, order }))
    })
    .parse(rest)?;
    let (rest, _) = ws.parse(rest)?;

    let (rest, limit) = opt(|i| {
        let (i, _) = tag_no_case("LIMIT").parse(i)?;
        let (i, _) = ws1.parse(i)?;
        let (i, n) = digit1.parse(i)?;
        Ok((i, n.parse::<usize>().unwrap_or(0)))
    })
    .parse(rest)?;

    Ok((
        rest,
        SelectStatement {
            db: String::new(),
            namespace: String::new(),
            metric,
            distinct: distinct.is_some(),
            fields,
            condition,
            group_by: group,
            order,
            limit,
        },
    ))
}

fn key_value_list(input: &str) -> PResult<'_, BTreeMap<String, Value>> {
    let (rest, _) = char('(').parse(input)?;
    let (rest, _) = ws.parse(rest)?;
    let (rest, pairs) = separated_list1(
        (char(','), ws),
        (identifier, char('='), value_literal),
    )
    .parse(rest)?;
    let (rest, _) = ws.parse(rest)?;
    let (rest, _) = char(')').parse(rest)?;
    let map = pairs.into_iter().map(|(k, _, v)| (k, v)).collect();
    Ok((rest, map))
}

fn insert_statement(input: &str) -> PResult<'_, InsertStatement> {
    let (rest, _) = tag_no_case("INSERT").parse(input)?;
    let (rest, _) = ws1.parse(rest)?;
    let (rest, _) = tag_no_case("INTO").parse(rest)?;
    let (rest, _) = ws1.parse(rest)?;
    let (rest, metric) = identifier.parse(rest)?;
    let (rest, _) = ws.parse(rest)?;

    let (rest, timestamp) = opt(|i| {
        let (i, _) = tag_no_case("TS").parse(i)?;
        let (i, _) = ws1.parse(i)?;
        let (i, ts) = signed_integer.parse(i)?;
        Ok((i, ts))
    })
    .parse(rest)?;
    let (rest, _) = ws.parse(rest)?;

    let (rest, dimensions) = opt(|i| {
        let (i, _) = tag_no_case("DIM").parse(i)?;
        let (i, _) = ws1.parse(i)?;
        key_value_list(i)
    })
    .parse(rest)?;
    let (rest, _) = ws.parse(rest)?;

    let (rest, tags) = opt(|i| {
        let (i, _) = tag_no_case("TAGS").parse(i)?;
        let (i, _) = ws1.parse(i)?;
        key_value_list(i)
    })
    .parse(rest)?;
    let (rest, _) = ws.parse(rest)?;

    let (rest, _) = tag_no_case("VAL").parse(rest)?;
    let (rest, _) = ws1.parse(rest)?;
    let (rest, value) = number_literal.parse(rest)?;

    Ok((
        rest,
        InsertStatement {
            db: String::new(),
            namespace: String::new(),
            metric,
            timestamp,
            dimensions: dimensions.unwrap_or_default(),
            tags: tags.unwrap_or_default(),
            value,
        },
    ))
}

fn delete_statement(input: &str) -> PResult<'_, DeleteStatement> {
    let (rest, _) = tag_no_case("DELETE").parse(input)?;
    let (rest, _) = ws1.parse(rest)?;
    let (rest, _) = tag_no_case("FROM").parse(rest)?;
    let (rest, _) = ws1.parse(rest)?;
    let (rest, metric) = identifier.parse(rest)?;
    let (rest, _) = ws1.parse(rest)?;
    let (rest, _) = tag_no_case("WHERE").parse(rest)?;
    let (rest, _) = ws1.parse(rest)?;
    let (rest, condition) = or_expr(rest)?;
    Ok((
        rest,
        DeleteStatement {
            db: String::new(),
            namespace: String::new(),
            metric,
            condition,
        },
    ))
}

fn drop_statement(input: &str) -> PResult<'_, DropStatement> {
    let (rest, _) = tag_no_case("DROP").parse(input)?;
    let (rest, _) = ws1.parse(rest)?;
    let (rest, _) = tag_no_case("METRIC").parse(rest)?;
    let (rest, _) = ws1.parse(rest)?;
    let (rest, metric) = identifier.parse(rest)?;
    Ok((
        rest,
        DropStatement {
            db: String::new(),
            namespace: String::new(),
            metric,
        },
    ))
}

fn statement(input: &str) -> PResult<'_, Statement> {
    alt((
        map(select_statement, Statement::Select),
        map(insert_statement, Statement::Insert),
        map(delete_statement, Statement::Delete),
        map(drop_statement, Statement::Drop),
    ))
    .parse(input)
}

/// Parses a single statement in the dialect described in the external interface
/// (SELECT/INSERT/DELETE/DROP). `db`/`namespace` are not part of the statement text;
/// callers set them via `with_context` / the corresponding struct field after parsing.
pub fn parse_statement(input: &str) -> Result<Statement, Error> {
    let trimmed = input.trim().trim_end_matches(';');
    match statement(trimmed) {
        Ok((remaining, stmt)) if remaining.trim().is_empty() => Ok(stmt),
        Ok((remaining, _)) => Err(Error::ParseError {
            message: format!("unexpected trailing input: {remaining:?}"),
        }),
        Err(e) => Err(Error::ParseError {
            message: format!("{e}"),
        }),
    }
}
