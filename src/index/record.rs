use crate::core::types::Record;
use serde::{Deserialize, Serialize};

/// An on-disk slot: `None` once soft-deleted, preserved so existing slot indices
/// stay stable after a delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Slot {
    Live(Record),
    Deleted,
}

impl Slot {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Slot::Live(r) => Some(r),
            Slot::Deleted => None,
        }
    }
}
