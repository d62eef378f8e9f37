use crate::ast::{parse_statement, Expression, InsertStatement, Statement};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::Config;
use crate::core::error::Error;
use crate::core::types::Record;
use crate::coordinator::read::{ReadCoordinator, ResultRow};
use crate::index::engine::IndexEngine;
use crate::schema::registry::{Schema, SchemaRegistry};
use crate::shard::router::ShardRouter;
use crate::storage::layout::StorageLayout;
use crate::writer::accumulator::{Operation, WriteAccumulator};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// What executing a parsed statement returns to the caller.
#[derive(Debug, Clone)]
pub enum EngineResponse {
    Rows(Vec<ResultRow>),
    Ack,
}

/// The services scoped to one (db, namespace) pair: a schema registry, shard router,
/// write accumulator and the read coordinator that ties them to the shared index engine.
struct Namespace {
    schema_registry: Arc<RwLock<SchemaRegistry>>,
    router: Arc<ShardRouter>,
    accumulator: Arc<WriteAccumulator>,
    coordinator: ReadCoordinator,
}

/// The sole process-wide handle. Composes the schema registry, shard router,
/// per-namespace write accumulators and the read coordinator behind one
/// `start -> serve -> shutdown` lifecycle, with process-wide state limited to this
/// handle rather than a global registry lookup.
pub struct Engine {
    config: Config,
    layout: Arc<StorageLayout>,
    clock: Arc<dyn Clock>,
    index_engine: Arc<IndexEngine>,
    namespaces: RwLock<HashMap<(String, String), Arc<Namespace>>>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let layout = Arc::new(StorageLayout::new(config.base_path.clone()));
        let index_engine = Arc::new(IndexEngine::new(layout.clone(), config.searcher_cache_size));
        Engine {
            config,
            layout,
            clock,
            index_engine,
            namespaces: RwLock::new(HashMap::new()),
            flush_task: Mutex::new(None),
        }
    }

    /// Single-node core: every location is owned by this node (spec's multi-node
    /// consensus and cluster discovery are explicit non-goals).
    fn node_id(&self) -> &str {
        "local"
    }

    /// Returns the namespace's handle, loading its persisted schema and wiring up the
    /// router/accumulator/coordinator on first use.
    fn namespace(&self, db: &str, namespace: &str) -> Result<Arc<Namespace>, Error> {
        let key = (db.to_string(), namespace.to_string());
        if let Some(existing) = self.namespaces.read().get(&key) {
            return Ok(existing.clone());
        }
        let mut namespaces = self.namespaces.write();
        if let Some(existing) = namespaces.get(&key) {
            return Ok(existing.clone());
        }
        let schema_path = self.layout.schema_file(db, namespace);
        let schema_registry = Arc::new(RwLock::new(SchemaRegistry::load_or_create(&schema_path)?));
        let router = Arc::new(ShardRouter::new(
            self.node_id(),
            self.config.shard_interval.as_millis() as i64,
        ));
        let accumulator = Arc::new(WriteAccumulator::new(db, namespace));
        let coordinator = ReadCoordinator::new(
            db,
            namespace,
            schema_registry.clone(),
            router.clone(),
            self.index_engine.clone(),
            self.clock.clone(),
            self.config.query_default_limit,
        );
        let handle = Arc::new(Namespace {
            schema_registry,
            router,
            accumulator,
            coordinator,
        });
        namespaces.insert(key, handle.clone());
        Ok(handle)
    }

    /// Parses and executes one statement against `(db, namespace)`. INSERT, DELETE and
    /// DROP return `Ack`; SELECT returns `Rows`.
    pub fn execute(&self, db: &str, namespace: &str, sql: &str) -> Result<EngineResponse, Error> {
        let statement = parse_statement(sql)?;
        self.execute_statement(db, namespace, statement)
    }

    /// Executes `sql` under a deadline. `deadline` defaults to
    /// `config.metadata_deadline` for DROP and `config.read_deadline` for
    /// SELECT/INSERT/DELETE. Runs the statement on a blocking task and races it
    /// against the deadline; on expiry this returns `Error::Timeout` but the task
    /// itself keeps running to completion rather than being aborted mid-flight, so a
    /// timed-out write or delete still lands exactly as if it hadn't timed out.
    pub async fn execute_with_deadline(
        self: &Arc<Self>,
        db: &str,
        namespace: &str,
        sql: &str,
        deadline: Option<std::time::Duration>,
    ) -> Result<EngineResponse, Error> {
        let statement = parse_statement(sql)?;
        let deadline = deadline.unwrap_or(match &statement {
            Statement::Drop(_) => self.config.metadata_deadline,
            _ => self.config.read_deadline,
        });
        let engine = self.clone();
        let db = db.to_string();
        let namespace = namespace.to_string();
        let task = tokio::task::spawn_blocking(move || {
            engine.execute_statement(&db, &namespace, statement)
        });
        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(Error::InternalError(format!(
                "execution task panicked: {join_error}"
            ))),
            Err(_elapsed) => Err(Error::Timeout(deadline)),
        }
    }

    pub fn execute_statement(
        &self,
        db: &str,
        namespace: &str,
        statement: Statement,
    ) -> Result<EngineResponse, Error> {
        match statement {
            Statement::Select(mut stmt) => {
                stmt = stmt.with_context(db, namespace);
                let ns = self.namespace(db, namespace)?;
                Ok(EngineResponse::Rows(ns.coordinator.execute(&stmt)?))
            }
            Statement::Insert(mut stmt) => {
                stmt.db = db.to_string();
                stmt.namespace = namespace.to_string();
                self.insert(stmt)?;
                Ok(EngineResponse::Ack)
            }
            Statement::Delete(mut stmt) => {
                stmt.db = db.to_string();
                stmt.namespace = namespace.to_string();
                let ns = self.namespace(db, namespace)?;
                ns.coordinator.execute_delete(&stmt, &ns.accumulator)?;
                Ok(EngineResponse::Ack)
            }
            Statement::Drop(mut stmt) => {
                stmt.db = db.to_string();
                stmt.namespace = namespace.to_string();
                let ns = self.namespace(db, namespace)?;
                ns.coordinator.execute_drop(&stmt)?;
                ns.schema_registry
                    .read()
                    .save(&self.layout.schema_file(db, namespace))?;
                Ok(EngineResponse::Ack)
            }
        }
    }

    fn insert(&self, stmt: InsertStatement) -> Result<(), Error> {
        let ns = self.namespace(&stmt.db, &stmt.namespace)?;
        let timestamp = stmt.timestamp.unwrap_or_else(|| self.clock.now_millis());
        let mut record = Record::new(timestamp, stmt.value);
        for (name, value) in stmt.dimensions {
            record = record.with_dimension(name, value);
        }
        for (name, value) in stmt.tags {
            record = record.with_tag(name, value);
        }
        {
            let mut registry = ns.schema_registry.write();
            registry.update_from_record(&stmt.metric, &record)?;
            registry.save(&self.layout.schema_file(&stmt.db, &stmt.namespace))?;
        }
        ns.accumulator.enqueue(&stmt.metric, Operation::Write(record));
        Ok(())
    }

    pub fn get_schema(&self, db: &str, namespace: &str, metric: &str) -> Result<Option<Schema>, Error> {
        Ok(self.namespace(db, namespace)?.coordinator.get_schema(metric))
    }

    pub fn get_metrics(&self, db: &str, namespace: &str) -> Result<Vec<String>, Error> {
        Ok(self.namespace(db, namespace)?.coordinator.get_metrics())
    }

    pub fn get_count(
        &self,
        db: &str,
        namespace: &str,
        metric: &str,
        condition: Option<&Expression>,
    ) -> Result<usize, Error> {
        self.namespace(db, namespace)?.coordinator.get_count(metric, condition)
    }

    /// Drains every namespace's write accumulator once. Called by the background
    /// scheduler and, synchronously, by `shutdown`.
    fn flush_all(&self) {
        let namespaces: Vec<Arc<Namespace>> = self.namespaces.read().values().cloned().collect();
        let now = self.clock.now_millis();
        for ns in namespaces {
            let outcome = ns.accumulator.flush_tick(&ns.router, &self.index_engine, now);
            if !outcome.failed.is_empty() {
                tracing::warn!(failed = outcome.failed.len(), "flush tick left metrics unflushed");
            }
        }
    }

    /// Drains every namespace's write accumulator once, synchronously. Useful for
    /// callers without a Tokio runtime (tests, benchmarks, one-shot CLI invocations)
    /// that still want writes to become visible to reads immediately.
    pub fn flush_now(&self) {
        self.flush_all();
    }

    /// Starts the periodic write-scheduler task that drains every accumulator every
    /// `write_scheduler_interval`. Requires an enclosing Tokio runtime. `self` must be
    /// wrapped in `Arc` so the background task can outlive the caller's stack frame.
    pub fn start(self: &Arc<Self>) {
        let engine = self.clone();
        let interval = self.config.write_scheduler_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                engine.flush_all();
            }
        });
        *self.flush_task.lock() = Some(handle);
    }

    /// Stops the background scheduler, if running, and performs one final,
    /// synchronous drain of every accumulator so no acknowledged write is lost.
    pub async fn shutdown(&self) -> Result<(), Error> {
        if let Some(handle) = self.flush_task.lock().take() {
            handle.abort();
        }
        self.flush_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use tempfile::tempdir;

    fn engine_with(dir: &std::path::Path) -> Engine {
        let config = Config {
            base_path: dir.to_path_buf(),
            ..Config::default()
        };
        Engine::with_clock(config, Arc::new(FixedClock::new(1_000)))
    }

    #[tokio::test]
    async fn insert_is_invisible_until_flush_then_selectable() {
        let dir = tempdir().unwrap();
        let engine = engine_with(dir.path());
        engine
            .execute("db", "ns", "INSERT INTO people TS 10 DIM (name='A') TAGS (city='X') VAL 1")
            .unwrap();

        let before = engine.execute("db", "ns", "SELECT * FROM people").unwrap();
        match before {
            EngineResponse::Rows(rows) => assert!(rows.is_empty()),
            _ => panic!("expected rows"),
        }

        engine.shutdown().await.unwrap();

        let after = engine.execute("db", "ns", "SELECT * FROM people").unwrap();
        match after {
            EngineResponse::Rows(rows) => assert_eq!(rows.len(), 1),
            _ => panic!("expected rows"),
        }
    }

    #[tokio::test]
    async fn delete_then_flush_removes_matching_rows() {
        let dir = tempdir().unwrap();
        let engine = engine_with(dir.path());
        engine
            .execute("db", "ns", "INSERT INTO people TS 10 DIM (name='A') TAGS (city='X') VAL 1")
            .unwrap();
        engine.shutdown().await.unwrap();

        engine.execute("db", "ns", "DELETE FROM people WHERE name = 'A'").unwrap();
        engine.shutdown().await.unwrap();

        let result = engine.execute("db", "ns", "SELECT * FROM people").unwrap();
        match result {
            EngineResponse::Rows(rows) => assert!(rows.is_empty()),
            _ => panic!("expected rows"),
        }
    }

    #[tokio::test]
    async fn drop_metric_forgets_schema() {
        let dir = tempdir().unwrap();
        let engine = engine_with(dir.path());
        engine
            .execute("db", "ns", "INSERT INTO people TS 10 DIM (name='A') TAGS (city='X') VAL 1")
            .unwrap();
        engine.shutdown().await.unwrap();
        assert!(engine.get_schema("db", "ns", "people").unwrap().is_some());

        engine.execute("db", "ns", "DROP METRIC people").unwrap();
        assert!(engine.get_schema("db", "ns", "people").unwrap().is_none());
    }

    #[tokio::test]
    async fn execute_with_deadline_succeeds_under_ample_budget() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(engine_with(dir.path()));
        let response = engine
            .execute_with_deadline(
                "db",
                "ns",
                "INSERT INTO people TS 10 DIM (name='A') VAL 1",
                Some(std::time::Duration::from_secs(1)),
            )
            .await
            .unwrap();
        assert!(matches!(response, EngineResponse::Ack));
    }

    #[tokio::test]
    async fn execute_with_deadline_times_out_under_zero_budget() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(engine_with(dir.path()));
        let result = engine
            .execute_with_deadline(
                "db",
                "ns",
                "INSERT INTO people TS 10 DIM (name='A') VAL 1",
                Some(std::time::Duration::ZERO),
            )
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[test]
    fn schema_conflict_surfaces_as_error() {
        let dir = tempdir().unwrap();
        let engine = engine_with(dir.path());
        engine
            .execute("db", "ns", "INSERT INTO people TS 10 DIM (name='A') VAL 1")
            .unwrap();
        let err = engine.execute("db", "ns", "INSERT INTO people TS 11 DIM (name=2) VAL 1");
        assert!(matches!(err, Err(Error::SchemaConflict { .. })));
    }
}
