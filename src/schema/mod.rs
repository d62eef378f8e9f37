pub mod registry;

pub use registry::{FieldKind, Schema, SchemaRegistry, ValueType};
