use nsdb_core::core::clock::FixedClock;
use nsdb_core::core::config::Config;
use nsdb_core::core::error::Error;
use nsdb_core::core::types::Value;
use nsdb_core::{Engine, EngineResponse};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn rows_of(response: EngineResponse) -> Vec<std::collections::BTreeMap<String, Value>> {
    match response {
        EngineResponse::Rows(rows) => rows,
        EngineResponse::Ack => panic!("expected Rows, got Ack"),
    }
}

/// S1 - Insert and range select: a flushed range query over `timestamp` returns
/// exactly the records whose timestamp falls inside the inclusive bound.
#[tokio::test]
async fn s1_insert_and_range_select() {
    let dir = tempdir().unwrap();
    let config = Config {
        base_path: dir.path().to_path_buf(),
        ..Config::default()
    };
    let engine = Engine::with_clock(config, Arc::new(FixedClock::new(0)));

    engine
        .execute("db", "ns", "INSERT INTO people TS 10 DIM (name='A') VAL 1")
        .unwrap();
    engine
        .execute("db", "ns", "INSERT INTO people TS 20 DIM (name='B') VAL 2")
        .unwrap();
    engine
        .execute("db", "ns", "INSERT INTO people TS 30 DIM (name='A') VAL 3")
        .unwrap();
    engine.shutdown().await.unwrap();

    let rows = rows_of(
        engine
            .execute(
                "db",
                "ns",
                "SELECT * FROM people WHERE timestamp >= 10 AND timestamp <= 20",
            )
            .unwrap(),
    );
    assert_eq!(rows.len(), 2);
    let timestamps: std::collections::BTreeSet<i64> = rows
        .iter()
        .map(|r| match r.get("timestamp") {
            Some(Value::Int(ts)) => *ts,
            other => panic!("expected Int timestamp, got {other:?}"),
        })
        .collect();
    assert_eq!(
        timestamps,
        std::collections::BTreeSet::from([10, 20])
    );
}

/// S2 - Limit + order with sharding: results merged across multiple small,
/// interval-aligned locations still honor a global ORDER BY ... LIMIT.
#[tokio::test]
async fn s2_limit_and_order_across_shards() {
    let dir = tempdir().unwrap();
    let config = Config {
        base_path: dir.path().to_path_buf(),
        shard_interval: Duration::from_millis(5),
        ..Config::default()
    };
    let engine = Engine::with_clock(config, Arc::new(FixedClock::new(0)));

    for ts in 1..=10i64 {
        engine
            .execute("db", "ns", &format!("INSERT INTO m TS {ts} VAL {ts}"))
            .unwrap();
    }
    engine.shutdown().await.unwrap();

    let rows = rows_of(
        engine
            .execute("db", "ns", "SELECT * FROM m ORDER BY timestamp DESC LIMIT 2")
            .unwrap(),
    );
    let timestamps: Vec<i64> = rows
        .iter()
        .map(|r| match r.get("timestamp") {
            Some(Value::Int(ts)) => *ts,
            other => panic!("expected Int timestamp, got {other:?}"),
        })
        .collect();
    assert_eq!(timestamps, vec![10, 9]);
}

/// S3 - Group-by tag with count: per-group counts are exact after merging across
/// whatever locations each tag's records landed in.
#[tokio::test]
async fn s3_group_by_tag_with_count() {
    let dir = tempdir().unwrap();
    let config = Config {
        base_path: dir.path().to_path_buf(),
        ..Config::default()
    };
    let engine = Engine::with_clock(config, Arc::new(FixedClock::new(0)));

    for i in 0..3 {
        engine
            .execute(
                "db",
                "ns",
                &format!("INSERT INTO m TS {i} TAGS (city='X') VAL 1"),
            )
            .unwrap();
    }
    for i in 0..2 {
        engine
            .execute(
                "db",
                "ns",
                &format!("INSERT INTO m TS {} TAGS (city='Y') VAL 1", i + 100),
            )
            .unwrap();
    }
    engine.shutdown().await.unwrap();

    let rows = rows_of(
        engine
            .execute("db", "ns", "SELECT count(*) FROM m GROUP BY city")
            .unwrap(),
    );
    let counts: std::collections::BTreeMap<String, i64> = rows
        .iter()
        .map(|r| {
            let city = match r.get("city") {
                Some(Value::String(s)) => s.clone(),
                other => panic!("expected String city, got {other:?}"),
            };
            let count = match r.get("count(*)") {
                Some(Value::Int(n)) => *n,
                other => panic!("expected Int count, got {other:?}"),
            };
            (city, count)
        })
        .collect();
    assert_eq!(counts.get("X"), Some(&3));
    assert_eq!(counts.get("Y"), Some(&2));
}

/// S4 - Temporal group-by: `GROUP BY interval` buckets by floor-divided timestamp,
/// independent of which location each record flushed into.
#[tokio::test]
async fn s4_temporal_group_by() {
    let dir = tempdir().unwrap();
    let config = Config {
        base_path: dir.path().to_path_buf(),
        ..Config::default()
    };
    let engine = Engine::with_clock(config, Arc::new(FixedClock::new(0)));

    for ts in [0i64, 30, 60, 90] {
        engine
            .execute("db", "ns", &format!("INSERT INTO m TS {ts} VAL {ts}"))
            .unwrap();
    }
    engine.shutdown().await.unwrap();

    let rows = rows_of(
        engine
            .execute("db", "ns", "SELECT avg(value) FROM m GROUP BY interval 60ms")
            .unwrap(),
    );
    let buckets: std::collections::BTreeSet<i64> = rows
        .iter()
        .map(|r| match r.get("timestamp") {
            Some(Value::Int(ts)) => *ts,
            other => panic!("expected Int bucket, got {other:?}"),
        })
        .collect();
    assert_eq!(buckets, std::collections::BTreeSet::from([0, 60]));
    assert_eq!(rows.len(), 2);
}

/// S5 - Relative time: `now - 100 ms` resolves against the injected clock, not
/// wall-clock time, and excludes records older than the resolved bound.
#[tokio::test]
async fn s5_relative_time_resolves_against_injected_clock() {
    let dir = tempdir().unwrap();
    let config = Config {
        base_path: dir.path().to_path_buf(),
        ..Config::default()
    };
    let engine = Engine::with_clock(config, Arc::new(FixedClock::new(1_000)));

    engine
        .execute("db", "ns", "INSERT INTO m TS 800 VAL 1")
        .unwrap();
    engine
        .execute("db", "ns", "INSERT INTO m TS 900 VAL 2")
        .unwrap();
    engine
        .execute("db", "ns", "INSERT INTO m TS 1000 VAL 3")
        .unwrap();
    engine.shutdown().await.unwrap();

    let rows = rows_of(
        engine
            .execute("db", "ns", "SELECT * FROM m WHERE timestamp >= now - 100 ms")
            .unwrap(),
    );
    let timestamps: std::collections::BTreeSet<i64> = rows
        .iter()
        .map(|r| match r.get("timestamp") {
            Some(Value::Int(ts)) => *ts,
            other => panic!("expected Int timestamp, got {other:?}"),
        })
        .collect();
    assert_eq!(
        timestamps,
        std::collections::BTreeSet::from([900, 1000])
    );
}

/// S6 - Schema conflict: a second insert with an incompatible type for an already
/// recorded field is rejected, naming the field and its expected type.
#[tokio::test]
async fn s6_schema_conflict_names_field_and_expected_type() {
    let dir = tempdir().unwrap();
    let config = Config {
        base_path: dir.path().to_path_buf(),
        ..Config::default()
    };
    let engine = Engine::with_clock(config, Arc::new(FixedClock::new(0)));

    engine
        .execute("db", "ns", "INSERT INTO m TS 0 DIM (name='A') VAL 1")
        .unwrap();
    let err = engine
        .execute("db", "ns", "INSERT INTO m TS 1 DIM (name=42) VAL 1")
        .unwrap_err();
    match err {
        Error::SchemaConflict { field, expected, .. } => {
            assert_eq!(field, "name");
            assert_eq!(expected, "String");
        }
        other => panic!("expected SchemaConflict, got {other:?}"),
    }
}
