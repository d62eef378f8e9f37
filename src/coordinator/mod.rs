pub mod read;

pub use read::{ReadCoordinator, ResultRow};
