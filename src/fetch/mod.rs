pub mod error;
pub mod incremental;
