use crate::types::error::DataError;
use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to determine data directory")]
    DataDirResolution,

    #[error("Failed to create ledger directory '{0}'")]
    DirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to read ledger '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    // The file is rolled back to its previous length before this is returned.
    #[error("Failed to append to ledger '{0}'")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode rows for ledger '{0}'")]
    Encode(PathBuf, #[source] csv::Error),

    #[error("Failed to scan ledger '{0}'")]
    FrameScan(PathBuf, #[source] PolarsError),

    #[error(transparent)]
    Data(#[from] DataError),
}
