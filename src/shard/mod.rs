pub mod location;
pub mod router;

pub use location::Location;
pub use router::{ShardRouter, TimeBound};
