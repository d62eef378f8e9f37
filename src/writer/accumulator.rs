use crate::core::error::Error;
use crate::core::types::Record;
use crate::index::engine::IndexEngine;
use crate::index::query::IndexQuery;
use crate::shard::location::Location;
use crate::shard::router::ShardRouter;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// A pending mutation against a metric's storage. `DeleteByQuery` already carries the
/// [`Location`] it targets: the read coordinator resolves intersecting locations once,
/// at enqueue time, and fans out one operation per location.
#[derive(Debug, Clone)]
pub enum Operation {
    Write(Record),
    DeleteByRecord(Record),
    DeleteByQuery(Location, IndexQuery),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccumulatorState {
    Accepting,
    Draining,
}

/// Result of one flush tick: which metrics drained cleanly and which failed (and so
/// keep their buffer intact for the next tick).
#[derive(Debug, Default)]
pub struct FlushOutcome {
    pub flushed: Vec<String>,
    pub failed: Vec<(String, Error)>,
}

/// A per-namespace buffer of pending [`Operation`]s keyed by metric. `enqueue`
/// acknowledges immediately; a tick later, `flush_tick` drains every metric's buffer
/// into the index engine in enqueue order. Implements the accepting/draining state
/// machine: while draining, further enqueues are stashed and replayed
/// FIFO once the drain completes, so no operation is lost or reordered.
pub struct WriteAccumulator {
    db: String,
    namespace: String,
    state: Mutex<AccumulatorState>,
    buffers: Mutex<BTreeMap<String, VecDeque<Operation>>>,
    pending: Mutex<Vec<(String, Operation)>>,
}

impl WriteAccumulator {
    pub fn new(db: impl Into<String>, namespace: impl Into<String>) -> Self {
        WriteAccumulator {
            db: db.into(),
            namespace: namespace.into(),
            state: Mutex::new(AccumulatorState::Accepting),
            buffers: Mutex::new(BTreeMap::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn is_draining(&self) -> bool {
        matches!(*self.state.lock(), AccumulatorState::Draining)
    }

    /// Returns immediately; `op` is not yet durable. Stashed instead of buffered while
    /// a flush is draining this accumulator.
    pub fn enqueue(&self, metric: &str, op: Operation) {
        let state = *self.state.lock();
        match state {
            AccumulatorState::Accepting => {
                self.buffers
                    .lock()
                    .entry(metric.to_string())
                    .or_default()
                    .push_back(op);
            }
            AccumulatorState::Draining => {
                self.pending.lock().push((metric.to_string(), op));
            }
        }
    }

    pub fn pending_metrics(&self) -> Vec<String> {
        self.buffers.lock().keys().cloned().collect()
    }

    /// Drains and applies every metric's buffer against `router`/`index_engine`.
    /// Per-metric I/O failures leave that metric's buffer intact (via `retry`) for the
    /// next tick; stashed enqueues that arrived mid-drain are replayed before returning
    /// to the accepting state.
    pub fn flush_tick(
        &self,
        router: &ShardRouter,
        index_engine: &IndexEngine,
        now_millis: i64,
    ) -> FlushOutcome {
        *self.state.lock() = AccumulatorState::Draining;
        let drained = std::mem::take(&mut *self.buffers.lock());

        let mut outcome = FlushOutcome::default();
        let mut retry = BTreeMap::new();
        for (metric, ops) in drained {
            tracing::debug!(db = %self.db, namespace = %self.namespace, metric = %metric, ops = ops.len(), "flushing metric");
            match self.flush_metric(&metric, &ops, router, index_engine) {
                Ok(()) => outcome.flushed.push(metric),
                Err(err) => {
                    tracing::warn!(db = %self.db, namespace = %self.namespace, metric = %metric, error = %err, "flush failed, retrying next tick");
                    outcome.failed.push((metric.clone(), err));
                    retry.insert(metric, ops);
                }
            }
        }
        let _ = now_millis;

        let stashed = std::mem::take(&mut *self.pending.lock());
        *self.buffers.lock() = retry;
        *self.state.lock() = AccumulatorState::Accepting;
        for (metric, op) in stashed {
            self.enqueue(&metric, op);
        }
        outcome
    }

    fn flush_metric(
        &self,
        metric: &str,
        ops: &VecDeque<Operation>,
        router: &ShardRouter,
        index_engine: &IndexEngine,
    ) -> Result<(), Error> {
        let mut opened: HashSet<String> = HashSet::new();
        let mut touched: Vec<Location> = Vec::new();

        for op in ops {
            let location = match op {
                Operation::Write(record) => router.location_for_write(metric, record.timestamp),
                Operation::DeleteByRecord(record) => {
                    router.location_for_write(metric, record.timestamp)
                }
                Operation::DeleteByQuery(location, _) => location.clone(),
            };
            router.register(location.clone());
            let location_id = location.location_id();
            let handle = index_engine.open(&self.db, &self.namespace, metric, &location_id)?;
            let mut index = handle.lock();
            if opened.insert(location_id.clone()) {
                index.open_writer()?;
                touched.push(location);
            }
            match op {
                Operation::Write(record) => {
                    if let Err(conflicts) = crate::index::store::LocationIndex::validate(record) {
                        tracing::warn!(metric, errors = ?conflicts, "dropping invalid record");
                        continue;
                    }
                    index.write(record.clone());
                }
                Operation::DeleteByRecord(record) => index.delete_by_record(record),
                Operation::DeleteByQuery(_, query) => index.delete_by_query(query),
            }
        }

        for location in &touched {
            let location_id = location.location_id();
            let handle = index_engine.open(&self.db, &self.namespace, metric, &location_id)?;
            handle.lock().flush()?;
            index_engine.invalidate(&self.db, &self.namespace, metric, &location_id);
        }
        Ok(())
    }
}
