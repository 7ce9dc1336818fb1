pub mod device;
pub mod error;
pub mod measurement;
pub mod metric;
