use std::path::PathBuf;
use thiserror::Error;

/// Malformed or inconsistent data, either from the provider or read back from the ledger.
///
/// These are never repaired silently.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Device at position {index} has no identifier")]
    MissingDeviceId { index: usize },

    #[error("Module at position {index} of device '{device_id}' has no identifier")]
    MissingModuleId { device_id: String, index: usize },

    #[error("Timestamp {found} for '{entity_id}' does not follow {previous}")]
    NonMonotonic {
        entity_id: String,
        previous: i64,
        found: i64,
    },

    #[error("Timestamp {0} is out of range")]
    TimestampOutOfRange(i64),

    #[error("Ledger '{path}' is corrupt at line {line}: {reason}")]
    CorruptLedger {
        path: PathBuf,
        line: u64,
        reason: String,
    },
}
