use crate::ast::expression::{ComparisonOp, Expression};
use crate::shard::location::Location;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// A `[from, to]` bound on the timestamp field extracted from a condition.
/// Over-approximation (returning a wider range than strictly necessary) is
/// acceptable; under-approximation is forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBound {
    pub from: i64,
    pub to: i64,
}

impl TimeBound {
    pub const UNBOUNDED: TimeBound = TimeBound {
        from: i64::MIN,
        to: i64::MAX,
    };

    fn intersect(self, other: TimeBound) -> TimeBound {
        TimeBound {
            from: self.from.max(other.from),
            to: self.to.min(other.to),
        }
    }

    /// Convex hull: the smallest range containing both bounds. Used for OR, which
    /// over-approximates and relies on the backing query to post-filter false positives.
    fn hull(self, other: TimeBound) -> TimeBound {
        TimeBound {
            from: self.from.min(other.from),
            to: self.to.max(other.to),
        }
    }
}

fn value_as_millis(value: &crate::core::types::Value) -> i64 {
    value.as_f64().unwrap_or(0.0) as i64
}

/// Extracts the tightest derivable bound on `timestamp` from a condition, resolving
/// relative times against `now_millis`. Predicates over non-timestamp fields
/// contribute `(-inf, +inf)`.
pub fn extract_time_bound(expr: &Expression, now_millis: i64) -> TimeBound {
    match expr {
        Expression::Range(field, from, to) if field == "timestamp" => TimeBound {
            from: value_as_millis(&from.resolve(now_millis)),
            to: value_as_millis(&to.resolve(now_millis)),
        },
        Expression::Comparison(field, op, value) if field == "timestamp" => {
            let v = value_as_millis(&value.resolve(now_millis));
            match op {
                ComparisonOp::Gt => TimeBound {
                    from: v + 1,
                    to: i64::MAX,
                },
                ComparisonOp::Gte => TimeBound {
                    from: v,
                    to: i64::MAX,
                },
                ComparisonOp::Lt => TimeBound {
                    from: i64::MIN,
                    to: v - 1,
                },
                ComparisonOp::Lte => TimeBound {
                    from: i64::MIN,
                    to: v,
                },
            }
        }
        Expression::Equality(field, value) if field == "timestamp" => {
            let v = value_as_millis(value);
            TimeBound { from: v, to: v }
        }
        Expression::And(a, b) => {
            extract_time_bound(a, now_millis).intersect(extract_time_bound(b, now_millis))
        }
        Expression::Or(a, b) => {
            extract_time_bound(a, now_millis).hull(extract_time_bound(b, now_millis))
        }
        Expression::Not(_) | Expression::Nullable(_) | Expression::Like(_, _) => {
            TimeBound::UNBOUNDED
        }
        _ => TimeBound::UNBOUNDED,
    }
}

/// Maintains, per metric, the ordered set of [`Location`]s on this node and routes
/// reads/writes to the right one(s).
#[derive(Default)]
pub struct ShardRouter {
    node: String,
    shard_interval_ms: i64,
    locations: RwLock<BTreeMap<String, Vec<Location>>>,
}

impl ShardRouter {
    pub fn new(node: impl Into<String>, shard_interval_ms: i64) -> Self {
        ShardRouter {
            node: node.into(),
            shard_interval_ms,
            locations: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the location covering `timestamp`, creating it if absent.
    pub fn location_for_write(&self, metric: &str, timestamp: i64) -> Location {
        let mut locations = self.locations.write();
        let entries = locations.entry(metric.to_string()).or_default();
        if let Some(existing) = entries.iter().find(|l| l.contains(timestamp)) {
            return existing.clone();
        }
        let new_location = Location::aligned(metric, &self.node, timestamp, self.shard_interval_ms);
        entries.push(new_location.clone());
        entries.sort_by_key(|l| l.from);
        new_location
    }

    /// Returns every location of `metric` whose interval intersects the bound derived
    /// from `condition`. No timestamp bound in the condition means "every location".
    pub fn locations_for_read(&self, metric: &str, condition: Option<&Expression>, now_millis: i64) -> Vec<Location> {
        let bound = condition
            .map(|c| extract_time_bound(c, now_millis))
            .unwrap_or(TimeBound::UNBOUNDED);
        let locations = self.locations.read();
        locations
            .get(metric)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|l| l.intersects(bound.from, bound.to))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all_locations(&self, metric: &str) -> Vec<Location> {
        self.locations
            .read()
            .get(metric)
            .cloned()
            .unwrap_or_default()
    }

    /// Forgets every location of `metric`, e.g. on DROP METRIC.
    pub fn clear(&self, metric: &str) {
        self.locations.write().remove(metric);
    }

    pub fn register(&self, location: Location) {
        let mut locations = self.locations.write();
        let entries = locations.entry(location.metric.clone()).or_default();
        if !entries.iter().any(|l| l.from == location.from) {
            entries.push(location);
            entries.sort_by_key(|l| l.from);
        }
    }
}
