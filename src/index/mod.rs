pub mod collector;
pub mod engine;
pub mod query;
pub mod record;
pub mod store;

pub use collector::{Accumulator, AggregateOutput, GroupKey};
pub use engine::IndexEngine;
pub use query::IndexQuery;
pub use store::LocationIndex;