pub mod csv_ledger;
pub mod error;
pub mod frame;
