//! Measurement rows as returned by `getmeasure` and stored in the ledger.

use crate::types::error::DataError;
use crate::types::metric::Metric;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One timestamped set of readings for a single entity.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureRow {
    pub timestamp: DateTime<Utc>,
    /// Reading per metric. `None` when the provider reported `null`.
    pub values: BTreeMap<Metric, Option<f64>>,
}

impl MeasureRow {
    pub fn new(timestamp: DateTime<Utc>, values: BTreeMap<Metric, Option<f64>>) -> Self {
        Self { timestamp, values }
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied().flatten()
    }
}

/// Rows returned for one entity by one `getmeasure` call.
///
/// Timestamps are strictly increasing; [`MeasurementBatch::new`] rejects anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementBatch {
    entity_id: String,
    rows: Vec<MeasureRow>,
}

impl MeasurementBatch {
    pub fn new(entity_id: impl Into<String>, rows: Vec<MeasureRow>) -> Result<Self, DataError> {
        let entity_id = entity_id.into();
        ensure_increasing(&entity_id, None, &rows)?;
        Ok(Self { entity_id, rows })
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn rows(&self) -> &[MeasureRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<MeasureRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.rows.last().map(|row| row.timestamp)
    }
}

/// Last persisted timestamp of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    pub entity_id: String,
    pub last_timestamp: DateTime<Utc>,
}

/// Checks that every row is strictly later than `after` and than the row before it.
pub(crate) fn ensure_increasing(
    entity_id: &str,
    after: Option<DateTime<Utc>>,
    rows: &[MeasureRow],
) -> Result<(), DataError> {
    let mut previous = after;
    for row in rows {
        if let Some(previous) = previous {
            if row.timestamp <= previous {
                return Err(DataError::NonMonotonic {
                    entity_id: entity_id.to_string(),
                    previous: previous.timestamp(),
                    found: row.timestamp.timestamp(),
                });
            }
        }
        previous = Some(row.timestamp);
    }
    Ok(())
}

pub(crate) fn from_unix(seconds: i64) -> Result<DateTime<Utc>, DataError> {
    DateTime::from_timestamp(seconds, 0).ok_or(DataError::TimestampOutOfRange(seconds))
}
