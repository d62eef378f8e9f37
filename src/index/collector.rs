use crate::ast::aggregation::Aggregation;
use crate::core::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running state sufficient to finalize any of {count, sum, min, max, first, last, avg}.
/// Kept generic rather than one type per aggregation so a single pass over matching
/// records serves every aggregation requested in a projection, and so partial results
/// from different shards merge with one associative operation per field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Accumulator {
    pub count: u64,
    pub sum: f64,
    pub min: Option<Value>,
    pub max: Option<Value>,
    /// (timestamp, insertion_index, value) — tie-broken by timestamp then arrival order.
    pub first: Option<(i64, u64, Value)>,
    pub last: Option<(i64, u64, Value)>,
}

impl Accumulator {
    pub fn add(&mut self, timestamp: i64, insertion_index: u64, value: &Value) {
        self.count += 1;
        self.sum += value.as_f64().unwrap_or(0.0);
        self.min = Some(match &self.min {
            Some(m) => m.min(value),
            None => value.clone(),
        });
        self.max = Some(match &self.max {
            Some(m) => m.max(value),
            None => value.clone(),
        });
        match &self.first {
            Some((ts, idx, _)) if (*ts, *idx) <= (timestamp, insertion_index) => {}
            _ => self.first = Some((timestamp, insertion_index, value.clone())),
        }
        match &self.last {
            Some((ts, idx, _)) if (*ts, *idx) >= (timestamp, insertion_index) => {}
            _ => self.last = Some((timestamp, insertion_index, value.clone())),
        }
    }

    /// Associative, commutative merge (except first/last, which stay tie-broken by
    /// timestamp then insertion order, matching the single-pass semantics exactly).
    pub fn merge(&mut self, other: &Accumulator) {
        if other.count == 0 {
            return;
        }
        self.count += other.count;
        self.sum += other.sum;
        self.min = Some(match (&self.min, &other.min) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a.clone(),
            (None, Some(b)) => b.clone(),
            (None, None) => return,
        });
        self.max = Some(match (&self.max, &other.max) {
            (Some(a), Some(b)) => a.max(b),
            (Some(a), None) => a.clone(),
            (None, Some(b)) => b.clone(),
            (None, None) => unreachable!(),
        });
        self.first = match (&self.first, &other.first) {
            (Some(a), Some(b)) => Some(if (a.0, a.1) <= (b.0, b.1) { a.clone() } else { b.clone() }),
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };
        self.last = match (&self.last, &other.last) {
            (Some(a), Some(b)) => Some(if (a.0, a.1) >= (b.0, b.1) { a.clone() } else { b.clone() }),
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };
    }

    pub fn finalize(&self, aggregation: Aggregation) -> Value {
        match aggregation {
            Aggregation::Count => Value::Int(self.count as i64),
            Aggregation::Sum => Value::Float(self.sum),
            Aggregation::Avg => {
                if self.count == 0 {
                    Value::Float(0.0)
                } else {
                    Value::Float(self.sum / self.count as f64)
                }
            }
            Aggregation::Min => self.min.clone().unwrap_or(Value::Float(0.0)),
            Aggregation::Max => self.max.clone().unwrap_or(Value::Float(0.0)),
            Aggregation::First => self.first.clone().map(|(_, _, v)| v).unwrap_or(Value::Float(0.0)),
            Aggregation::Last => self.last.clone().map(|(_, _, v)| v).unwrap_or(Value::Float(0.0)),
        }
    }
}

/// A group key: `None` for a scalar (no GROUP BY) aggregation, `Some` for a tag value
/// or temporal bucket start.
pub type GroupKey = Option<Value>;

fn group_key_sort_bytes(key: &GroupKey) -> Vec<u8> {
    match key {
        None => vec![0],
        Some(v) => {
            let mut bytes = vec![1];
            bytes.extend(v.to_sort_key());
            bytes
        }
    }
}

/// Per-shard aggregation output: one [`Accumulator`] per group key, in group order.
#[derive(Debug, Clone, Default)]
pub struct AggregateOutput {
    groups: BTreeMap<Vec<u8>, (GroupKey, Accumulator)>,
}

impl AggregateOutput {
    pub fn new() -> Self {
        AggregateOutput::default()
    }

    pub fn add(&mut self, key: GroupKey, timestamp: i64, insertion_index: u64, value: &Value) {
        let sort_bytes = group_key_sort_bytes(&key);
        let entry = self
            .groups
            .entry(sort_bytes)
            .or_insert_with(|| (key, Accumulator::default()));
        entry.1.add(timestamp, insertion_index, value);
    }

    /// Merges another shard's output into this one, group by group.
    pub fn merge(&mut self, other: &AggregateOutput) {
        for (sort_bytes, (key, acc)) in &other.groups {
            let entry = self
                .groups
                .entry(sort_bytes.clone())
                .or_insert_with(|| (key.clone(), Accumulator::default()));
            entry.1.merge(acc);
        }
    }

    pub fn into_rows(self) -> Vec<(GroupKey, Accumulator)> {
        self.groups.into_values().collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = &(GroupKey, Accumulator)> {
        self.groups.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_of_partitions_equals_single_pass() {
        let values = [
            (0i64, Value::Int(1)),
            (1, Value::Int(2)),
            (2, Value::Int(3)),
            (3, Value::Int(4)),
        ];

        let mut whole = AggregateOutput::new();
        for (i, (ts, v)) in values.iter().enumerate() {
            whole.add(None, *ts, i as u64, v);
        }

        let mut left = AggregateOutput::new();
        let mut right = AggregateOutput::new();
        for (i, (ts, v)) in values.iter().enumerate() {
            if i < 2 {
                left.add(None, *ts, i as u64, v);
            } else {
                right.add(None, *ts, i as u64, v);
            }
        }
        left.merge(&right);

        let whole_row = whole.into_rows().into_iter().next().unwrap().1;
        let merged_row = left.into_rows().into_iter().next().unwrap().1;
        assert_eq!(whole_row.count, merged_row.count);
        assert_eq!(whole_row.sum, merged_row.sum);
        assert_eq!(
            whole_row.finalize(Aggregation::Avg),
            merged_row.finalize(Aggregation::Avg)
        );
    }

    #[test]
    fn first_last_tie_break_by_timestamp_then_insertion_order() {
        let mut acc = Accumulator::default();
        acc.add(5, 0, &Value::Int(10));
        acc.add(5, 1, &Value::Int(20));
        acc.add(1, 2, &Value::Int(30));
        assert_eq!(acc.finalize(Aggregation::First), Value::Int(30));
        assert_eq!(acc.finalize(Aggregation::Last), Value::Int(20));
    }
}
