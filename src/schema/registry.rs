use crate::core::error::Error;
use crate::core::types::{Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Int,
    Float,
    Decimal,
    String,
}

impl ValueType {
    pub fn of(value: &Value) -> ValueType {
        match value {
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Decimal(_, _) => ValueType::Decimal,
            Value::String(_) => ValueType::String,
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::Int => "Int",
            ValueType::Float => "Float",
            ValueType::Decimal => "Decimal",
            ValueType::String => "String",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Dimension(ValueType),
    Tag(ValueType),
    Timestamp,
    Value(ValueType),
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Dimension(t) => write!(f, "Dimension({t})"),
            FieldKind::Tag(t) => write!(f, "Tag({t})"),
            FieldKind::Timestamp => write!(f, "Timestamp"),
            FieldKind::Value(t) => write!(f, "Value({t})"),
        }
    }
}

impl FieldKind {
    /// The `ValueType` a field of this kind carries, or `None` for `Timestamp`.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            FieldKind::Dimension(t) | FieldKind::Tag(t) | FieldKind::Value(t) => Some(*t),
            FieldKind::Timestamp => None,
        }
    }

    /// The type string reported in a `SchemaConflict` (§8 S6: "its expected type
    /// string"), e.g. `"String"` rather than `"Dimension(String)"`.
    fn conflict_type_name(&self) -> String {
        match self.value_type() {
            Some(t) => t.to_string(),
            None => "Timestamp".to_string(),
        }
    }
}

/// The declared field kinds and types of a metric, inferred and widened from
/// incoming records. A schema only grows: a field's `FieldKind` never changes once set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: BTreeMap<String, FieldKind>,
}

impl Schema {
    pub fn from_record(record: &Record) -> Schema {
        let mut fields = BTreeMap::new();
        fields.insert("timestamp".to_string(), FieldKind::Timestamp);
        fields.insert(
            "value".to_string(),
            FieldKind::Value(ValueType::of(&record.value)),
        );
        for (name, value) in &record.dimensions {
            fields.insert(name.clone(), FieldKind::Dimension(ValueType::of(value)));
        }
        for (name, value) in &record.tags {
            fields.insert(name.clone(), FieldKind::Tag(ValueType::of(value)));
        }
        Schema { fields }
    }

    /// Checks `record` against this schema, returning the list of incompatible
    /// (field, expected, found) triples. An empty list means the record is compatible.
    pub fn conflicts(&self, record: &Record) -> Vec<(String, FieldKind, FieldKind)> {
        let mut conflicts = Vec::new();
        let mut check = |name: &str, found: FieldKind| {
            if let Some(expected) = self.fields.get(name) {
                if *expected != found {
                    conflicts.push((name.to_string(), *expected, found));
                }
            }
        };
        check("value", FieldKind::Value(ValueType::of(&record.value)));
        for (name, value) in &record.dimensions {
            check(name, FieldKind::Dimension(ValueType::of(value)));
        }
        for (name, value) in &record.tags {
            check(name, FieldKind::Tag(ValueType::of(value)));
        }
        conflicts
    }

    /// Adds fields from `record` that are not yet present. Caller must have already
    /// verified there are no conflicts.
    fn widen(&mut self, record: &Record) {
        self.fields
            .entry("value".to_string())
            .or_insert_with(|| FieldKind::Value(ValueType::of(&record.value)));
        for (name, value) in &record.dimensions {
            self.fields
                .entry(name.clone())
                .or_insert_with(|| FieldKind::Dimension(ValueType::of(value)));
        }
        for (name, value) in &record.tags {
            self.fields
                .entry(name.clone())
                .or_insert_with(|| FieldKind::Tag(ValueType::of(value)));
        }
    }
}

/// Per (db, namespace) mapping of metric name to [`Schema`]. Persisted as a single
/// index file per namespace (see `storage::layout`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry {
            schemas: BTreeMap::new(),
        }
    }

    /// Loads the persisted registry at `path`, or an empty one if it doesn't exist yet.
    pub fn load_or_create(path: &std::path::Path) -> Result<Self, Error> {
        if !path.exists() {
            return Ok(SchemaRegistry::new());
        }
        let bytes = std::fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = bincode::serialize(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn get(&self, metric: &str) -> Option<&Schema> {
        self.schemas.get(metric)
    }

    /// Installs a schema inferred from `record` if the metric is unknown; otherwise
    /// ensures compatibility and widens the schema with any new fields.
    pub fn update_from_record(&mut self, metric: &str, record: &Record) -> Result<(), Error> {
        match self.schemas.get_mut(metric) {
            None => {
                self.schemas
                    .insert(metric.to_string(), Schema::from_record(record));
                Ok(())
            }
            Some(schema) => {
                let conflicts = schema.conflicts(record);
                if let Some((field, expected, found)) = conflicts.into_iter().next() {
                    return Err(Error::SchemaConflict {
                        metric: metric.to_string(),
                        field,
                        expected: expected.conflict_type_name(),
                        found: found.conflict_type_name(),
                    });
                }
                schema.widen(record);
                Ok(())
            }
        }
    }

    /// Replaces the metric's schema only if `new_schema` is a superset-compatible
    /// widening of the current one (or the metric is unknown).
    pub fn update(&mut self, metric: &str, new_schema: Schema) -> Result<(), Error> {
        if let Some(current) = self.schemas.get(metric) {
            for (name, kind) in &current.fields {
                match new_schema.fields.get(name) {
                    Some(new_kind) if new_kind == kind => {}
                    Some(new_kind) => {
                        return Err(Error::SchemaConflict {
                            metric: metric.to_string(),
                            field: name.clone(),
                            expected: kind.conflict_type_name(),
                            found: new_kind.conflict_type_name(),
                        });
                    }
                    None => {
                        return Err(Error::SchemaConflict {
                            metric: metric.to_string(),
                            field: name.clone(),
                            expected: kind.conflict_type_name(),
                            found: "missing".to_string(),
                        });
                    }
                }
            }
        }
        self.schemas.insert(metric.to_string(), new_schema);
        Ok(())
    }

    pub fn delete(&mut self, metric: &str) {
        self.schemas.remove(metric);
    }

    pub fn delete_all(&mut self) {
        self.schemas.clear();
    }

    pub fn metrics(&self) -> impl Iterator<Item = &String> {
        self.schemas.keys()
    }
}
