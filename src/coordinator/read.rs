use crate::ast::aggregation::{Aggregation, GroupBy};
use crate::ast::expression::Expression;
use crate::ast::statement::{DeleteStatement, DropStatement, SelectStatement, SortOrder};
use crate::core::clock::Clock;
use crate::core::error::Error;
use crate::core::types::{Record, Value};
use crate::index::collector::AggregateOutput;
use crate::index::engine::IndexEngine;
use crate::index::query::IndexQuery;
use crate::planner::{plan_backing_query, plan_select, PhysicalQuery, ProjectionPlan};
use crate::schema::registry::{Schema, SchemaRegistry};
use crate::shard::location::Location;
use crate::shard::router::ShardRouter;
use crate::writer::accumulator::{Operation, WriteAccumulator};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A query result row: column name to value, used uniformly for plain projections
/// (`timestamp`, `value`, dimension/tag names) and aggregated rows (the group-by
/// column plus one column per aggregated field, e.g. `sum(value)`).
pub type ResultRow = BTreeMap<String, Value>;

fn sort_key_of(record: &Record, field: &str) -> Option<Vec<u8>> {
    if field == "timestamp" {
        Some(Value::Int(record.timestamp).to_sort_key())
    } else {
        record.field(field).map(Value::to_sort_key)
    }
}

fn sort_records(records: &mut [Record], field: &str, order: SortOrder) {
    records.sort_by(|a, b| {
        let ord = match (sort_key_of(a, field), sort_key_of(b, field)) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (None, None) => std::cmp::Ordering::Equal,
        };
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}

fn project(projection: &ProjectionPlan, record: &Record) -> ResultRow {
    let mut row = BTreeMap::new();
    match projection {
        ProjectionPlan::AllFields => {
            row.insert("timestamp".to_string(), Value::Int(record.timestamp));
            row.insert("value".to_string(), record.value.clone());
            for (k, v) in &record.dimensions {
                row.insert(k.clone(), v.clone());
            }
            for (k, v) in &record.tags {
                row.insert(k.clone(), v.clone());
            }
        }
        ProjectionPlan::ListFields(fields) => {
            for (name, _) in fields {
                let value = if name == "timestamp" {
                    Some(Value::Int(record.timestamp))
                } else {
                    record.field(name).cloned()
                };
                if let Some(v) = value {
                    row.insert(name.clone(), v);
                }
            }
        }
    }
    row
}

fn column_label(field: &str, aggregation: Aggregation) -> String {
    format!("{}({})", aggregation.name(), field)
}

fn group_by_column_name(group_by: &GroupBy) -> String {
    match group_by {
        GroupBy::Simple(tag) => tag.clone(),
        GroupBy::Temporal { .. } => "timestamp".to_string(),
    }
}

/// Given a statement, resolves schema, enumerates relevant shards, dispatches planned
/// queries, merges per-shard results, applies global ordering/limit. One instance is
/// scoped to a single (db, namespace); the owning [`crate::engine::Engine`] holds one
/// per namespace, mirroring the write accumulator's scoping.
pub struct ReadCoordinator {
    db: String,
    namespace: String,
    schema_registry: Arc<RwLock<SchemaRegistry>>,
    router: Arc<ShardRouter>,
    index_engine: Arc<IndexEngine>,
    clock: Arc<dyn Clock>,
    default_limit: usize,
}

impl ReadCoordinator {
    pub fn new(
        db: impl Into<String>,
        namespace: impl Into<String>,
        schema_registry: Arc<RwLock<SchemaRegistry>>,
        router: Arc<ShardRouter>,
        index_engine: Arc<IndexEngine>,
        clock: Arc<dyn Clock>,
        default_limit: usize,
    ) -> Self {
        ReadCoordinator {
            db: db.into(),
            namespace: namespace.into(),
            schema_registry,
            router,
            index_engine,
            clock,
            default_limit,
        }
    }

    pub fn get_schema(&self, metric: &str) -> Option<Schema> {
        self.schema_registry.read().get(metric).cloned()
    }

    pub fn get_metrics(&self) -> Vec<String> {
        self.schema_registry.read().metrics().cloned().collect()
    }

    pub fn get_count(&self, metric: &str, condition: Option<&Expression>) -> Result<usize, Error> {
        let schema = self
            .get_schema(metric)
            .ok_or_else(|| Error::UnknownMetric(metric.to_string()))?;
        let now = self.clock.now_millis();
        let backing = match condition {
            Some(c) => plan_backing_query(c, &schema, now)?,
            None => IndexQuery::MatchAll,
        };
        let locations = self.router.locations_for_read(metric, condition, now);
        let mut total = 0;
        for location in &locations {
            let handle =
                self.index_engine
                    .open(&self.db, &self.namespace, metric, &location.location_id())?;
            total += handle.lock().count(&backing);
        }
        Ok(total)
    }

    /// Plans once, dispatches to every intersecting location, and merges results
    /// according to the merge rules below.
    pub fn execute(&self, stmt: &SelectStatement) -> Result<Vec<ResultRow>, Error> {
        let schema = self
            .get_schema(&stmt.metric)
            .ok_or_else(|| Error::UnknownMetric(stmt.metric.clone()))?;
        let now = self.clock.now_millis();
        let plan = plan_select(stmt, &schema, now, self.default_limit)?;
        let locations = self
            .router
            .locations_for_read(&stmt.metric, stmt.condition.as_ref(), now);

        if plan.is_aggregated() {
            self.execute_aggregated(&stmt.metric, &plan, &locations)
        } else {
            self.execute_plain(&stmt.metric, &plan, &locations)
        }
    }

    fn execute_plain(
        &self,
        metric: &str,
        plan: &PhysicalQuery,
        locations: &[Location],
    ) -> Result<Vec<ResultRow>, Error> {
        let sort = plan.sort.as_ref().map(|o| (o.field.as_str(), o.order));
        let mut merged: Vec<Record> = Vec::new();
        for location in locations {
            let handle =
                self.index_engine
                    .open(&self.db, &self.namespace, metric, &location.location_id())?;
            let rows = handle.lock().query(&plan.backing, plan.limit, sort);
            merged.extend(rows);
        }
        if let Some((field, order)) = sort {
            sort_records(&mut merged, field, order);
        }
        let mut rows: Vec<ResultRow> = merged.iter().map(|r| project(&plan.projection, r)).collect();
        if plan.distinct {
            let mut seen: Vec<ResultRow> = Vec::new();
            rows.retain(|row| {
                if seen.contains(row) {
                    false
                } else {
                    seen.push(row.clone());
                    true
                }
            });
        }
        if let Some(limit) = plan.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn execute_aggregated(
        &self,
        metric: &str,
        plan: &PhysicalQuery,
        locations: &[Location],
    ) -> Result<Vec<ResultRow>, Error> {
        let fields: Vec<(String, Aggregation)> = match &plan.projection {
            ProjectionPlan::ListFields(fs) => fs
                .iter()
                .filter_map(|(name, agg)| agg.map(|a| (name.clone(), a)))
                .collect(),
            ProjectionPlan::AllFields => {
                return Err(Error::InternalError(
                    "AllFields projection cannot be aggregated".to_string(),
                ))
            }
        };

        let mut rows: Vec<(crate::index::collector::GroupKey, ResultRow)> = Vec::new();
        for (name, aggregation) in &fields {
            let query_field = if name == "*" { "timestamp" } else { name.as_str() };
            let mut merged_out = AggregateOutput::new();
            for location in locations {
                let handle = self.index_engine.open(
                    &self.db,
                    &self.namespace,
                    metric,
                    &location.location_id(),
                )?;
                let out = handle
                    .lock()
                    .query_aggregated(&plan.backing, plan.group_by.as_ref(), query_field);
                merged_out.merge(&out);
            }
            let column = column_label(name, *aggregation);
            for (key, acc) in merged_out.into_rows() {
                let value = acc.finalize(*aggregation);
                match rows.iter_mut().find(|(k, _)| k == &key) {
                    Some((_, row)) => {
                        row.insert(column.clone(), value);
                    }
                    None => {
                        let mut row = BTreeMap::new();
                        row.insert(column.clone(), value);
                        rows.push((key, row));
                    }
                }
            }
        }

        if let Some(group_by) = &plan.group_by {
            let col = group_by_column_name(group_by);
            for (key, row) in rows.iter_mut() {
                if let Some(v) = key {
                    row.insert(col.clone(), v.clone());
                }
            }
        }

        let mut result: Vec<ResultRow> = rows.into_iter().map(|(_, row)| row).collect();
        if let Some(limit) = plan.limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    /// Lowers the condition the same way SELECT does, then enqueues a `DeleteByQuery`
    /// on every intersecting location's accumulator.
    pub fn execute_delete(
        &self,
        stmt: &DeleteStatement,
        accumulator: &WriteAccumulator,
    ) -> Result<(), Error> {
        let schema = self
            .get_schema(&stmt.metric)
            .ok_or_else(|| Error::UnknownMetric(stmt.metric.clone()))?;
        let now = self.clock.now_millis();
        let backing = plan_backing_query(&stmt.condition, &schema, now)?;
        let locations = self
            .router
            .locations_for_read(&stmt.metric, Some(&stmt.condition), now);
        for location in locations {
            accumulator.enqueue(
                &stmt.metric,
                Operation::DeleteByQuery(location, backing.clone()),
            );
        }
        Ok(())
    }

    /// Closes and removes every location's index for the metric, and forgets its
    /// schema and shard bookkeeping.
    pub fn execute_drop(&self, stmt: &DropStatement) -> Result<(), Error> {
        for location in self.router.all_locations(&stmt.metric) {
            let handle = self.index_engine.open(
                &self.db,
                &self.namespace,
                &stmt.metric,
                &location.location_id(),
            )?;
            {
                let mut index = handle.lock();
                index.delete_all();
                index.flush()?;
            }
            self.index_engine
                .invalidate(&self.db, &self.namespace, &stmt.metric, &location.location_id());
        }
        self.router.clear(&stmt.metric);
        self.schema_registry.write().delete(&stmt.metric);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::statement::{OrderBy, Projection, SelectedField};
    use crate::core::clock::FixedClock;
    use tempfile::tempdir;

    fn coordinator_with(
        dir: &std::path::Path,
        shard_interval_ms: i64,
    ) -> (ReadCoordinator, Arc<ShardRouter>, Arc<IndexEngine>, Arc<RwLock<SchemaRegistry>>, Arc<WriteAccumulator>) {
        let layout = Arc::new(crate::storage::layout::StorageLayout::new(dir.to_path_buf()));
        let router = Arc::new(ShardRouter::new("node-1", shard_interval_ms));
        let index_engine = Arc::new(IndexEngine::new(layout, 16));
        let schema_registry = Arc::new(RwLock::new(SchemaRegistry::new()));
        let accumulator = Arc::new(WriteAccumulator::new("db", "ns"));
        let coordinator = ReadCoordinator::new(
            "db",
            "ns",
            schema_registry.clone(),
            router.clone(),
            index_engine.clone(),
            Arc::new(FixedClock::new(0)),
            1000,
        );
        (coordinator, router, index_engine, schema_registry, accumulator)
    }

    fn insert(
        schema_registry: &Arc<RwLock<SchemaRegistry>>,
        accumulator: &WriteAccumulator,
        router: &ShardRouter,
        index_engine: &IndexEngine,
        metric: &str,
        record: Record,
    ) {
        schema_registry
            .write()
            .update_from_record(metric, &record)
            .unwrap();
        accumulator.enqueue(metric, Operation::Write(record));
        accumulator.flush_tick(router, index_engine, 0);
    }

    #[test]
    fn select_distinct_drops_duplicate_projected_rows() {
        let dir = tempdir().unwrap();
        let (coordinator, router, index_engine, schema_registry, accumulator) =
            coordinator_with(dir.path(), 1000);

        insert(
            &schema_registry,
            &accumulator,
            &router,
            &index_engine,
            "m",
            Record::new(1, Value::Int(1)).with_tag("city", Value::String("X".into())),
        );
        insert(
            &schema_registry,
            &accumulator,
            &router,
            &index_engine,
            "m",
            Record::new(2, Value::Int(2)).with_tag("city", Value::String("X".into())),
        );

        let mut stmt = SelectStatement::new("m");
        stmt.distinct = true;
        stmt.fields = Projection::ListFields(vec![SelectedField::plain("city")]);

        let rows = coordinator.execute(&stmt).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("city"), Some(&Value::String("X".into())));
    }

    #[test]
    fn reads_fan_out_and_merge_across_shards() {
        let dir = tempdir().unwrap();
        let (coordinator, router, index_engine, schema_registry, accumulator) =
            coordinator_with(dir.path(), 5);

        for ts in 1..=10i64 {
            insert(
                &schema_registry,
                &accumulator,
                &router,
                &index_engine,
                "m",
                Record::new(ts, Value::Int(ts)),
            );
        }

        let mut stmt = SelectStatement::new("m");
        stmt.order = Some(OrderBy {
            field: "timestamp".into(),
            order: SortOrder::Desc,
        });
        stmt.limit = Some(2);

        let rows = coordinator.execute(&stmt).unwrap();
        let timestamps: Vec<i64> = rows
            .iter()
            .map(|r| match r.get("timestamp") {
                Some(Value::Int(ts)) => *ts,
                other => panic!("expected Int timestamp, got {other:?}"),
            })
            .collect();
        assert_eq!(timestamps, vec![10, 9]);
    }
}
