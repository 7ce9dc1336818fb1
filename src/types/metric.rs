//! Defines the measurement names and aggregation scales understood by the
//! Netatmo `getmeasure` endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single measured quantity reported by a station or one of its modules.
///
/// The variant order is the column order used in the CSV ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Degrees Celsius.
    Temperature,
    /// Parts per million.
    #[serde(rename = "CO2")]
    Co2,
    /// Relative humidity in percent.
    Humidity,
    /// Decibels.
    Noise,
    /// Millibars, sea-level adjusted.
    Pressure,
}

impl Metric {
    /// The name the provider uses in `data_type` lists and in the `type` request parameter.
    pub fn api_name(&self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature",
            Metric::Co2 => "CO2",
            Metric::Humidity => "Humidity",
            Metric::Noise => "Noise",
            Metric::Pressure => "Pressure",
        }
    }

    /// Parses a provider data type name. Unknown names yield `None` so that new
    /// sensor types do not break station parsing.
    pub fn from_api_name(name: &str) -> Option<Self> {
        match name {
            "Temperature" => Some(Metric::Temperature),
            "CO2" => Some(Metric::Co2),
            "Humidity" => Some(Metric::Humidity),
            "Noise" => Some(Metric::Noise),
            "Pressure" => Some(Metric::Pressure),
            _ => None,
        }
    }

    pub(crate) fn join(metrics: &[Metric]) -> String {
        metrics
            .iter()
            .map(Metric::api_name)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

/// Aggregation step requested from `getmeasure`.
///
/// `Max` returns raw measurements (one every ~5 minutes); the others return
/// averages over the named interval.
///
/// # Examples
///
/// ```
/// use netatmo_ledger::Scale;
///
/// assert_eq!(Scale::default(), Scale::Max);
/// assert_eq!(Scale::ThreeHours.to_string(), "3hours");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scale {
    #[default]
    Max,
    ThirtyMinutes,
    OneHour,
    ThreeHours,
    OneDay,
    OneWeek,
    OneMonth,
}

impl Scale {
    pub(crate) fn api_name(&self) -> &'static str {
        match self {
            Scale::Max => "max",
            Scale::ThirtyMinutes => "30min",
            Scale::OneHour => "1hour",
            Scale::ThreeHours => "3hours",
            Scale::OneDay => "1day",
            Scale::OneWeek => "1week",
            Scale::OneMonth => "1month",
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_match_provider() {
        for metric in [
            Metric::Temperature,
            Metric::Co2,
            Metric::Humidity,
            Metric::Noise,
            Metric::Pressure,
        ] {
            assert_eq!(Metric::from_api_name(metric.api_name()), Some(metric));
        }
        assert_eq!(Metric::from_api_name("WindStrength"), None);
    }

    #[test]
    fn test_join_keeps_order() {
        assert_eq!(
            Metric::join(&[Metric::Temperature, Metric::Co2, Metric::Humidity]),
            "Temperature,CO2,Humidity"
        );
    }
}
