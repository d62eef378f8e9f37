pub mod physical;

pub use physical::{plan_backing_query, plan_select, PhysicalQuery, ProjectionPlan};
