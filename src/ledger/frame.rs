//! Contains `LedgerFrame`, a lazy polars view over one ledger file.

use crate::ledger::csv_ledger::{DELIMITER, ENTITY_COLUMN, TIMESTAMP_COLUMN};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::path::Path;

/// A wrapper around a Polars `LazyFrame` holding the rows of a ledger file.
///
/// Columns are `Timestamp` (unix seconds), `DateTime` (UTC text), `EntityId` and
/// one column per stored metric. Nothing is read until the frame is collected.
///
/// # Examples
///
/// ```no_run
/// use netatmo_ledger::{CsvLedger, EntityKind};
/// use chrono::{TimeZone, Utc};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ledger = CsvLedger::open("netatmo-data")?;
/// let january = ledger
///     .frame(EntityKind::Device)?
///     .for_entity("70:ee:50:aa:aa:aa")
///     .get_range(
///         Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
///         Utc.with_ymd_and_hms(2020, 1, 31, 23, 59, 59).unwrap(),
///     )
///     .frame
///     .collect()?;
/// println!("{}", january);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LedgerFrame {
    /// The underlying Polars LazyFrame.
    pub frame: LazyFrame,
}

impl LedgerFrame {
    pub(crate) fn scan(path: &Path) -> PolarsResult<Self> {
        let frame = LazyCsvReader::new(path)
            .with_has_header(true)
            .with_separator(DELIMITER)
            .finish()?;
        Ok(Self { frame })
    }

    /// Keeps only the rows of one station or module.
    pub fn for_entity(&self, entity_id: &str) -> LedgerFrame {
        self.filter(col(ENTITY_COLUMN).eq(lit(entity_id)))
    }

    /// Keeps rows with `start <= timestamp <= end`.
    pub fn get_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> LedgerFrame {
        self.filter(
            col(TIMESTAMP_COLUMN)
                .gt_eq(lit(start.timestamp()))
                .and(col(TIMESTAMP_COLUMN).lt_eq(lit(end.timestamp()))),
        )
    }

    pub fn filter(&self, predicate: Expr) -> LedgerFrame {
        LedgerFrame {
            frame: self.frame.clone().filter(predicate),
        }
    }
}
