pub mod layout;

pub use layout::StorageLayout;
