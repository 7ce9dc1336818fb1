//! Defines the station hierarchy returned by `getstationsdata`: a [`Device`]
//! (the base station) owning an ordered list of [`Module`]s, and the
//! [`Entity`] handle used to address either one when fetching measurements.

use crate::types::metric::Metric;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider type string of the base station.
pub const STATION_TYPE: &str = "NAMain";
/// Provider type string of the indoor module.
pub const INDOOR_MODULE_TYPE: &str = "NAModule4";

/// A weather station as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// MAC-like identifier, e.g. `70:ee:50:aa:aa:aa`.
    pub id: String,
    /// Name of the base module inside the station (`module_name`).
    pub name: Option<String>,
    /// User-visible station name.
    pub station_name: Option<String>,
    /// Provider type, `NAMain` for a station.
    pub device_type: String,
    pub date_setup: Option<DateTime<Utc>>,
    pub last_setup: Option<DateTime<Utc>>,
    /// Measurements the base module reports.
    pub data_types: Vec<Metric>,
    /// Time of the latest measurement shown on the dashboard.
    pub last_measured: Option<DateTime<Utc>>,
    /// Attached modules in provider order.
    pub modules: Vec<Module>,
}

/// A sensor unit attached to a [`Device`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    pub name: Option<String>,
    /// Provider type, e.g. `NAModule4` for the indoor module.
    pub module_type: String,
    /// Battery charge in percent.
    pub battery_level: Option<u8>,
    /// Radio signal quality (90 = low, 60 = highest).
    pub rf_status: Option<i32>,
    pub last_setup: Option<DateTime<Utc>>,
    pub data_types: Vec<Metric>,
    pub last_measured: Option<DateTime<Utc>>,
    /// Identifier of the owning station. Lookup only.
    pub device_id: String,
}

impl Device {
    pub fn is_station(&self) -> bool {
        self.device_type == STATION_TYPE
    }

    /// The station itself as a fetchable entity.
    ///
    /// A first fetch starts at the original `date_setup`; `last_setup` moves forward
    /// when the station is reinstalled, and starting there would skip the history in
    /// between. `last_setup` is used only when `date_setup` is unknown.
    pub fn entity(&self) -> Entity {
        Entity {
            kind: EntityKind::Device,
            device_id: self.id.clone(),
            module_id: None,
            data_types: self.data_types.clone(),
            first_available: self.date_setup.or(self.last_setup),
        }
    }

    /// The station followed by each of its modules, in provider order.
    pub fn entities(&self) -> Vec<Entity> {
        std::iter::once(self.entity())
            .chain(self.modules.iter().map(Module::entity))
            .collect()
    }
}

impl Module {
    pub fn is_indoor(&self) -> bool {
        self.module_type == INDOOR_MODULE_TYPE
    }

    pub fn entity(&self) -> Entity {
        Entity {
            kind: EntityKind::Module,
            device_id: self.device_id.clone(),
            module_id: Some(self.id.clone()),
            data_types: self.data_types.clone(),
            first_available: self.last_setup,
        }
    }
}

/// Whether an entity is a station or one of its modules. Selects the ledger file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Device,
    Module,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Device => f.write_str("device"),
            EntityKind::Module => f.write_str("module"),
        }
    }
}

/// Anything `getmeasure` can be asked about: a station, or a module of a station.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,
    pub device_id: String,
    pub module_id: Option<String>,
    /// Measurements the entity advertises. May be empty when unknown.
    pub data_types: Vec<Metric>,
    /// Lower bound for a first-ever fetch, usually the setup time.
    pub first_available: Option<DateTime<Utc>>,
}

impl Entity {
    /// Creates a station entity without metadata.
    pub fn device(device_id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Device,
            device_id: device_id.into(),
            module_id: None,
            data_types: Vec::new(),
            first_available: None,
        }
    }

    /// Creates a module entity without metadata.
    pub fn module(device_id: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Module,
            device_id: device_id.into(),
            module_id: Some(module_id.into()),
            data_types: Vec::new(),
            first_available: None,
        }
    }

    /// The identifier rows are keyed by in the ledger.
    pub fn id(&self) -> &str {
        self.module_id.as_deref().unwrap_or(&self.device_id)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id())
    }
}
