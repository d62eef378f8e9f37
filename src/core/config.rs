use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Engine-wide configuration, deserializable from TOML/JSON with human-readable durations
/// such as `"5s"` or `"10d"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for `schemas/` and `index/` subtrees.
    pub base_path: PathBuf,

    /// Width of each location (shard) time range.
    #[serde(with = "humantime_serde")]
    pub shard_interval: Duration,

    /// How often the write accumulator drains its buffer to the index.
    #[serde(with = "humantime_serde")]
    pub write_scheduler_interval: Duration,

    /// Default LIMIT applied to queries that don't specify one.
    pub query_default_limit: usize,

    /// Number of locations replicated per shard (accepted, not enforced; single-node core
    /// has nothing else to replicate to).
    pub replication_factor: usize,

    /// A location is eligible for passivation (search-only, no further writes expected)
    /// once its time range is this far in the past.
    #[serde(with = "humantime_serde")]
    pub passivate_after: Duration,

    /// Capacity of the per-metric searcher cache.
    pub searcher_cache_size: usize,

    /// Deadline applied to metadata operations (`get_schema`, `get_metrics`, DROP)
    /// absent a caller-supplied override.
    #[serde(with = "humantime_serde")]
    pub metadata_deadline: Duration,

    /// Default deadline applied to SELECT/DELETE absent a caller-supplied override.
    #[serde(with = "humantime_serde")]
    pub read_deadline: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_path: PathBuf::from("./data"),
            shard_interval: Duration::from_secs(3600),
            write_scheduler_interval: Duration::from_secs(5),
            query_default_limit: 1000,
            replication_factor: 1,
            passivate_after: Duration::from_secs(60 * 60 * 24),
            searcher_cache_size: 64,
            metadata_deadline: Duration::from_secs(1),
            read_deadline: Duration::from_secs(5),
        }
    }
}
