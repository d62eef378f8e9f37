use serde::{Deserialize, Serialize};

/// A time-range partition of a metric's storage on a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub metric: String,
    pub node: String,
    pub from: i64,
    pub to: i64,
}

impl Location {
    /// `"<from>_<to>"`, used as the on-disk directory name (see `storage::layout`).
    pub fn location_id(&self) -> String {
        format!("{}_{}", self.from, self.to)
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.from && timestamp <= self.to
    }

    pub fn intersects(&self, from: i64, to: i64) -> bool {
        self.from <= to && from <= self.to
    }

    /// Aligns `timestamp` to the `[from, to]` window of width `shard_interval` that
    /// contains it, on the given node.
    pub fn aligned(metric: &str, node: &str, timestamp: i64, shard_interval_ms: i64) -> Location {
        let shard_interval_ms = shard_interval_ms.max(1);
        let index = timestamp.div_euclid(shard_interval_ms);
        let from = index * shard_interval_ms;
        let to = from + shard_interval_ms - 1;
        Location {
            metric: metric.to_string(),
            node: node.to_string(),
            from,
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_location_covers_the_requested_timestamp() {
        let loc = Location::aligned("m", "node-1", 7, 5);
        assert!(loc.contains(7));
        assert_eq!(loc.from, 5);
        assert_eq!(loc.to, 9);
    }

    #[test]
    fn negative_timestamps_align_consistently() {
        let loc = Location::aligned("m", "node-1", -3, 5);
        assert!(loc.contains(-3));
    }

    #[test]
    fn location_id_encodes_the_range() {
        let loc = Location::aligned("m", "node-1", 12, 5);
        assert_eq!(loc.location_id(), "10_14");
    }
}
