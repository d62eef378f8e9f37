use crate::core::types::Value;
use serde::{Deserialize, Serialize};

/// A backing query against a single location's index. Produced by the planner,
/// consumed by the index engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexQuery {
    MatchAll,
    Term { field: String, value: Value },
    /// `[from, to]` with independent per-bound inclusivity; either bound may be
    /// absent for an open range. A `BETWEEN`/`Range` expression lowers to an
    /// inclusive bound on both sides; a strict `<`/`>` comparison lowers to an
    /// exclusive bound on the side it constrains.
    Range {
        field: String,
        from: Option<Value>,
        from_inclusive: bool,
        to: Option<Value>,
        to_inclusive: bool,
    },
    Wildcard { field: String, pattern: String },
    Exists { field: String },
    Not(Box<IndexQuery>),
    And(Vec<IndexQuery>),
    Or(Vec<IndexQuery>),
}

impl IndexQuery {
    pub fn and(clauses: Vec<IndexQuery>) -> IndexQuery {
        match clauses.len() {
            0 => IndexQuery::MatchAll,
            1 => clauses.into_iter().next().unwrap(),
            _ => IndexQuery::And(clauses),
        }
    }

    pub fn or(clauses: Vec<IndexQuery>) -> IndexQuery {
        match clauses.len() {
            0 => IndexQuery::MatchAll,
            1 => clauses.into_iter().next().unwrap(),
            _ => IndexQuery::Or(clauses),
        }
    }
}
