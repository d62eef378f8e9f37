use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;

/// A single tagged primitive carried by dimensions, tags and the numeric value field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Decimal(i64, u32), // unscaled value, scale (decimal digits after the point)
    String(String),
}

/// Result of comparing two [`Value`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Less,
    Equal,
    Greater,
    Incomparable,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Decimal(unscaled, scale) => {
                Some(*unscaled as f64 / 10f64.powi(*scale as i32))
            }
            Value::String(_) => None,
        }
    }

    fn is_numeric(&self) -> bool {
        !matches!(self, Value::String(_))
    }

    /// Mixed-tag comparisons other than numeric<->numeric are Incomparable, which causes
    /// the enclosing predicate to evaluate false.
    pub fn compare(&self, other: &Value) -> Comparison {
        match (self, other) {
            (Value::String(a), Value::String(b)) => match a.cmp(b) {
                CmpOrdering::Less => Comparison::Less,
                CmpOrdering::Equal => Comparison::Equal,
                CmpOrdering::Greater => Comparison::Greater,
            },
            _ if self.is_numeric() && other.is_numeric() => {
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => match a.partial_cmp(&b) {
                        Some(CmpOrdering::Less) => Comparison::Less,
                        Some(CmpOrdering::Equal) => Comparison::Equal,
                        Some(CmpOrdering::Greater) => Comparison::Greater,
                        None => Comparison::Incomparable,
                    },
                    _ => Comparison::Incomparable,
                }
            }
            _ => Comparison::Incomparable,
        }
    }

    /// A byte-stable sort key, usable across restarts (no pointer/hash based ordering).
    pub fn to_sort_key(&self) -> Vec<u8> {
        match self {
            Value::String(s) => {
                let mut key = vec![0u8];
                key.extend_from_slice(s.as_bytes());
                key
            }
            _ => {
                let mut key = vec![1u8];
                let f = self.as_f64().unwrap_or(0.0);
                let bits = f.to_bits();
                let flipped = if f.is_sign_negative() { !bits } else { bits | (1u64 << 63) };
                key.extend_from_slice(&flipped.to_be_bytes());
                key
            }
        }
    }

    pub fn add(&self, other: &Value) -> Value {
        Value::Float(self.as_f64().unwrap_or(0.0) + other.as_f64().unwrap_or(0.0))
    }

    pub fn div(&self, divisor: f64) -> Value {
        Value::Float(self.as_f64().unwrap_or(0.0) / divisor)
    }

    pub fn min(&self, other: &Value) -> Value {
        if matches!(self.compare(other), Comparison::Greater) {
            other.clone()
        } else {
            self.clone()
        }
    }

    pub fn max(&self, other: &Value) -> Value {
        if matches!(self.compare(other), Comparison::Less) {
            other.clone()
        } else {
            self.clone()
        }
    }

    /// `$` and `%` both mean "zero or more of any character".
    pub fn matches_wildcard(text: &str, pattern: &str) -> bool {
        let mut regex_pattern = String::with_capacity(pattern.len() + 2);
        regex_pattern.push('^');
        for part in pattern.split_inclusive(['$', '%']) {
            let (literal, wildcard) = match part.strip_suffix(['$', '%']) {
                Some(literal) => (literal, true),
                None => (part, false),
            };
            regex_pattern.push_str(&regex::escape(literal));
            if wildcard {
                regex_pattern.push_str(".*");
            }
        }
        regex_pattern.push('$');
        match regex::Regex::new(&regex_pattern) {
            Ok(re) => re.is_match(text),
            Err(_) => text == pattern,
        }
    }
}

/// A record ("Bit"): a single time-stamped observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: i64,
    pub value: Value,
    pub dimensions: BTreeMap<String, Value>,
    pub tags: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(timestamp: i64, value: Value) -> Self {
        Record {
            timestamp,
            value,
            dimensions: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_dimension(mut self, name: impl Into<String>, value: Value) -> Self {
        self.dimensions.insert(name.into(), value);
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: Value) -> Self {
        self.tags.insert(name.into(), value);
        self
    }

    /// Looks up a non-timestamp field by name (dimension, tag, or `value`).
    pub fn field(&self, name: &str) -> Option<&Value> {
        if name == "value" {
            return Some(&self.value);
        }
        self.dimensions.get(name).or_else(|| self.tags.get(name))
    }

    /// Identity used for exact-match deletes: timestamp plus the full field set.
    pub fn identity_key(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_comparison_is_cross_tag() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.0)), Comparison::Equal);
        assert_eq!(Value::Int(1).compare(&Value::Float(2.0)), Comparison::Less);
    }

    #[test]
    fn string_vs_numeric_is_incomparable() {
        assert_eq!(
            Value::String("a".into()).compare(&Value::Int(1)),
            Comparison::Incomparable
        );
    }

    #[test]
    fn wildcard_matches_dollar_and_percent() {
        assert!(Value::matches_wildcard("hello world", "hello$"));
        assert!(Value::matches_wildcard("hello world", "%world"));
        assert!(!Value::matches_wildcard("hello world", "goodbye%"));
    }

    #[test]
    fn sort_key_orders_like_the_numeric_value() {
        let mut pairs: Vec<_> = [-5.0, 10.0, 0.0, -1.0]
            .iter()
            .map(|f| (Value::Float(*f).to_sort_key(), *f))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let sorted_values: Vec<f64> = pairs.into_iter().map(|(_, f)| f).collect();
        let mut expected = vec![-5.0, -1.0, 0.0, 10.0];
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(sorted_values, expected);
    }
}
