use crate::ast::aggregation::GroupBy;
use crate::ast::statement::SortOrder;
use crate::core::error::Error;
use crate::core::types::{Comparison, Record, Value};
use crate::index::collector::AggregateOutput;
use crate::index::query::IndexQuery;
use crate::index::record::Slot;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

fn field_value(record: &Record, field: &str) -> Option<Value> {
    if field == "timestamp" {
        Some(Value::Int(record.timestamp))
    } else {
        record.field(field).cloned()
    }
}

fn matches(query: &IndexQuery, record: &Record) -> bool {
    match query {
        IndexQuery::MatchAll => true,
        IndexQuery::Term { field, value } => field_value(record, field)
            .map(|v| matches!(v.compare(value), Comparison::Equal))
            .unwrap_or(false),
        IndexQuery::Range {
            field,
            from,
            from_inclusive,
            to,
            to_inclusive,
        } => match field_value(record, field) {
            Some(v) => {
                let above_from = from
                    .as_ref()
                    .map(|f| match v.compare(f) {
                        Comparison::Greater => true,
                        Comparison::Equal => *from_inclusive,
                        _ => false,
                    })
                    .unwrap_or(true);
                let below_to = to
                    .as_ref()
                    .map(|t| match v.compare(t) {
                        Comparison::Less => true,
                        Comparison::Equal => *to_inclusive,
                        _ => false,
                    })
                    .unwrap_or(true);
                above_from && below_to
            }
            None => false,
        },
        IndexQuery::Wildcard { field, pattern } => match field_value(record, field) {
            Some(Value::String(s)) => Value::matches_wildcard(&s, pattern),
            _ => false,
        },
        IndexQuery::Exists { field } => field_value(record, field).is_some(),
        IndexQuery::Not(inner) => !matches(inner, record),
        IndexQuery::And(clauses) => clauses.iter().all(|c| matches(c, record)),
        IndexQuery::Or(clauses) => clauses.iter().any(|c| matches(c, record)),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    slots: Vec<Slot>,
}

/// The on-disk/in-memory index for a single (metric, location). Owned exclusively by
/// that partition's executor (see the concurrency model), so no internal locking.
pub struct LocationIndex {
    path: PathBuf,
    slots: Vec<Slot>,
    writer_open: bool,
    dirty: bool,
}

impl LocationIndex {
    /// Structural validation independent of schema compatibility (checked earlier by
    /// the schema registry): the value field must be numeric. Per-record failures here
    /// are logged and the record dropped; the rest of the batch still applies.
    pub fn validate(record: &Record) -> Result<(), Vec<String>> {
        if matches!(record.value, Value::String(_)) {
            return Err(vec!["value field must be numeric, found String".to_string()]);
        }
        Ok(())
    }

    pub fn load_or_create(path: PathBuf) -> Result<Self, Error> {
        if !path.exists() {
            return Ok(LocationIndex {
                path,
                slots: Vec::new(),
                writer_open: false,
                dirty: false,
            });
        }
        let mut file = std::fs::File::open(&path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        if bytes.len() < 4 {
            return Ok(LocationIndex {
                path,
                slots: Vec::new(),
                writer_open: false,
                dirty: false,
            });
        }
        let (checksum_bytes, body) = bytes.split_at(4);
        let expected = u32::from_le_bytes(checksum_bytes.try_into().unwrap());
        let mut hasher = Hasher::new();
        hasher.update(body);
        if hasher.finalize() != expected {
            return Err(Error::IndexIOError(format!(
                "checksum mismatch reading {}",
                path.display()
            )));
        }
        let persisted: PersistedIndex = bincode::deserialize(body)?;
        Ok(LocationIndex {
            path,
            slots: persisted.slots,
            writer_open: false,
            dirty: false,
        })
    }

    /// At most one open writer per index at a time.
    pub fn open_writer(&mut self) -> Result<(), Error> {
        if self.writer_open {
            return Err(Error::InternalError(format!(
                "writer already open for {}",
                self.path.display()
            )));
        }
        self.writer_open = true;
        Ok(())
    }

    pub fn write(&mut self, record: Record) {
        self.slots.push(Slot::Live(record));
        self.dirty = true;
    }

    /// Deletes every slot whose record matches `record`'s full field set exactly.
    pub fn delete_by_record(&mut self, record: &Record) {
        let key = record.identity_key();
        for slot in &mut self.slots {
            if let Slot::Live(r) = slot {
                if r.identity_key() == key {
                    *slot = Slot::Deleted;
                    self.dirty = true;
                }
            }
        }
    }

    pub fn delete_by_query(&mut self, query: &IndexQuery) {
        for slot in &mut self.slots {
            let hit = matches!(slot.as_record(), Some(r) if matches(query, r));
            if hit {
                *slot = Slot::Deleted;
                self.dirty = true;
            }
        }
    }

    pub fn delete_all(&mut self) {
        self.slots.clear();
        self.dirty = true;
    }

    /// Persists pending changes, closes the writer, and (at the cache-owning layer)
    /// invalidates the metric's searchers.
    pub fn flush(&mut self) -> Result<(), Error> {
        if !self.dirty {
            self.writer_open = false;
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = bincode::serialize(&PersistedIndex {
            slots: self.slots.clone(),
        })?;
        let mut hasher = Hasher::new();
        hasher.update(&body);
        let checksum = hasher.finalize();

        let mut file = std::fs::File::create(&self.path)?;
        file.write_all(&checksum.to_le_bytes())?;
        file.write_all(&body)?;
        file.sync_all()?;

        self.writer_open = false;
        self.dirty = false;
        Ok(())
    }

    fn live_records(&self) -> impl Iterator<Item = &Record> {
        self.slots.iter().filter_map(Slot::as_record)
    }

    pub fn count(&self, query: &IndexQuery) -> usize {
        self.live_records().filter(|r| matches(query, r)).count()
    }

    /// Non-aggregated retrieval: top-K under `sort` if given, else index order.
    pub fn query(
        &self,
        query: &IndexQuery,
        limit: Option<usize>,
        sort: Option<(&str, SortOrder)>,
    ) -> Vec<Record> {
        let mut matched: Vec<&Record> = self.live_records().filter(|r| matches(query, r)).collect();
        if let Some((field, order)) = sort {
            matched.sort_by(|a, b| {
                let av = field_value(a, field);
                let bv = field_value(b, field);
                let ord = match (av, bv) {
                    (Some(av), Some(bv)) => av.to_sort_key().cmp(&bv.to_sort_key()),
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
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        matched.into_iter().cloned().collect()
    }

    fn group_key_for(group_by: &GroupBy, record: &Record) -> Option<Value> {
        match group_by {
            GroupBy::Simple(tag) => record.tags.get(tag).cloned(),
            GroupBy::Temporal { interval_ms, .. } => {
                let interval = (*interval_ms).max(1);
                let bucket = record.timestamp.div_euclid(interval) * interval;
                Some(Value::Int(bucket))
            }
        }
    }

    /// Aggregated retrieval, bucketed by `group_by` (or a single `None`-keyed group
    /// when absent). `field` names the value being aggregated.
    pub fn query_aggregated(
        &self,
        query: &IndexQuery,
        group_by: Option<&GroupBy>,
        field: &str,
    ) -> AggregateOutput {
        let mut output = AggregateOutput::new();
        for (idx, record) in self.live_records().filter(|r| matches(query, r)).enumerate() {
            let key = match group_by {
                Some(g) => Self::group_key_for(g, record),
                None => None,
            };
            if let Some(value) = field_value(record, field) {
                output.add(key, record.timestamp, idx as u64, &value);
            }
        }
        output
    }
}
