use serde::{Deserialize, Serialize};

/// An aggregation function applicable to a projected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    Count,
    Sum,
    Min,
    Max,
    First,
    Last,
    Avg,
}

impl Aggregation {
    /// Legal without a GROUP BY clause.
    pub fn is_global(&self) -> bool {
        matches!(self, Aggregation::Count | Aggregation::Avg)
    }

    /// `avg` is computed from {count, sum} and divided at merge time; every other
    /// aggregation is primary and merges directly.
    pub fn is_derived(&self) -> bool {
        matches!(self, Aggregation::Avg)
    }

    /// count(*) is legal on any field, including non-numeric ones.
    pub fn requires_numeric_field(&self) -> bool {
        !matches!(self, Aggregation::Count)
    }

    /// Lowercase SQL name, used both by the parser and to label result columns
    /// (e.g. `sum(value)`).
    pub fn name(&self) -> &'static str {
        match self {
            Aggregation::Count => "count",
            Aggregation::Sum => "sum",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::First => "first",
            Aggregation::Last => "last",
            Aggregation::Avg => "avg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    /// Not part of the documented grammar's unit list but accepted for compatibility
    /// with literal millisecond offsets (e.g. `now - 100 ms`).
    Millis,
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    pub fn millis(&self) -> i64 {
        match self {
            TimeUnit::Millis => 1,
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
            TimeUnit::Day => 86_400_000,
        }
    }
}

/// How aggregated results are bucketed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupBy {
    /// Bucket by the distinct values of a tag.
    Simple(String),
    /// Bucket by `floor(timestamp / interval_ms) * interval_ms`.
    Temporal {
        interval_ms: i64,
        quantity: i64,
        unit: TimeUnit,
    },
}

impl GroupBy {
    pub fn temporal(quantity: i64, unit: TimeUnit) -> Self {
        GroupBy::Temporal {
            interval_ms: quantity * unit.millis(),
            quantity,
            unit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_and_avg_are_global() {
        assert!(Aggregation::Count.is_global());
        assert!(Aggregation::Avg.is_global());
        assert!(!Aggregation::Sum.is_global());
    }

    #[test]
    fn temporal_group_by_computes_interval_millis() {
        let g = GroupBy::temporal(60, TimeUnit::Second);
        match g {
            GroupBy::Temporal { interval_ms, .. } => assert_eq!(interval_ms, 60_000),
            _ => panic!("expected temporal"),
        }
    }
}
