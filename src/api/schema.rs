//! Wire shapes of the provider's JSON responses.
//!
//! Every field the client does not rely on is optional or absent, so new fields
//! added by the provider are ignored. Identifiers are optional here so that a
//! missing `_id` surfaces as a [`crate::DataError`] from the registry instead of a
//! generic decoding failure.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub(crate) struct StationDataEnvelope {
    pub body: StationDataBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StationDataBody {
    pub devices: Vec<RawDevice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDevice {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub station_name: Option<String>,
    pub module_name: Option<String>,
    #[serde(rename = "type")]
    pub device_type: Option<String>,
    pub date_setup: Option<i64>,
    pub last_setup: Option<i64>,
    #[serde(default)]
    pub data_type: Vec<String>,
    pub dashboard_data: Option<RawDashboard>,
    #[serde(default)]
    pub modules: Vec<RawModule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawModule {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub module_name: Option<String>,
    #[serde(rename = "type")]
    pub module_type: Option<String>,
    pub last_setup: Option<i64>,
    pub battery_percent: Option<u8>,
    pub rf_status: Option<i32>,
    #[serde(default)]
    pub data_type: Vec<String>,
    pub dashboard_data: Option<RawDashboard>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDashboard {
    pub time_utc: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeasureEnvelope {
    pub body: MeasureBody,
}

/// `getmeasure` answers `{"<ts>": [...]}` with `optimize=false` and a list of
/// evenly spaced chunks with `optimize=true`. An empty result is `[]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum MeasureBody {
    Keyed(BTreeMap<String, Vec<Option<f64>>>),
    Optimized(Vec<OptimizedChunk>),
}

#[derive(Debug, Deserialize)]
pub(crate) struct OptimizedChunk {
    pub beg_time: i64,
    pub step_time: Option<i64>,
    pub value: Vec<Vec<Option<f64>>>,
}

impl MeasureBody {
    /// Flattens either shape into `(timestamp, values)` rows.
    ///
    /// Keyed rows are sorted by timestamp. Chunks keep the provider's order, so
    /// overlapping chunks show up as repeated timestamps for the caller to reject.
    pub fn into_rows(self) -> Result<Vec<(i64, Vec<Option<f64>>)>, String> {
        match self {
            MeasureBody::Keyed(map) => {
                let mut rows = map
                    .into_iter()
                    .map(|(key, values)| {
                        key.parse::<i64>()
                            .map(|timestamp| (timestamp, values))
                            .map_err(|_| format!("timestamp key '{}' is not a number", key))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                rows.sort_by_key(|(timestamp, _)| *timestamp);
                Ok(rows)
            }
            MeasureBody::Optimized(chunks) => {
                let mut rows = Vec::new();
                for chunk in chunks {
                    if chunk.value.len() > 1 && chunk.step_time.is_none() {
                        return Err(format!("chunk at {} has no step_time", chunk.beg_time));
                    }
                    let step = chunk.step_time.unwrap_or(0);
                    for (i, values) in chunk.value.into_iter().enumerate() {
                        let offset = step.saturating_mul(i as i64);
                        rows.push((chunk.beg_time.saturating_add(offset), values));
                    }
                }
                Ok(rows)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Detailed {
        code: Option<i64>,
        message: Option<String>,
    },
    Plain(String),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorField,
    error_description: Option<String>,
}

/// Error reported in a response body, in either the API or the OAuth format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProviderError {
    pub code: Option<i64>,
    pub message: String,
}

pub(crate) fn provider_error(body: &[u8]) -> Option<ProviderError> {
    let envelope: ErrorEnvelope = serde_json::from_slice(body).ok()?;
    Some(match envelope.error {
        ErrorField::Detailed { code, message } => ProviderError {
            code,
            message: message.unwrap_or_default(),
        },
        ErrorField::Plain(error) => ProviderError {
            code: None,
            message: match envelope.error_description {
                Some(description) => format!("{}: {}", error, description),
                None => error,
            },
        },
    })
}

/// A short human-readable reason for a failed response.
pub(crate) fn describe_error(body: &[u8]) -> String {
    match provider_error(body) {
        Some(error) => match error.code {
            Some(code) => format!("{} (code {})", error.message, code),
            None => error.message,
        },
        None => String::from_utf8_lossy(body).chars().take(200).collect(),
    }
}
