//! In-memory model of the stations visible to the account, built from one
//! `getstationsdata` response.

use crate::api::schema::{RawDashboard, RawDevice, RawModule};
use crate::types::device::{Device, Entity, Module};
use crate::types::error::DataError;
use crate::types::measurement::from_unix;
use crate::types::metric::Metric;
use chrono::{DateTime, Utc};

/// The account's devices in provider order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationRegistry {
    devices: Vec<Device>,
}

/// A station's base module or one of its attached modules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModuleRef<'a> {
    Station(&'a Device),
    Module(&'a Module),
}

impl ModuleRef<'_> {
    pub fn entity(&self) -> Entity {
        match self {
            ModuleRef::Station(device) => device.entity(),
            ModuleRef::Module(module) => module.entity(),
        }
    }
}

impl StationRegistry {
    /// Validates and converts the raw device list.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::MissingDeviceId`] or [`DataError::MissingModuleId`] when an
    /// identifier is absent, and [`DataError::TimestampOutOfRange`] for unusable dates.
    pub fn build(raw_devices: Vec<RawDevice>) -> Result<Self, DataError> {
        let devices = raw_devices
            .into_iter()
            .enumerate()
            .map(|(index, raw)| convert_device(index, raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { devices })
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn into_devices(self) -> Vec<Device> {
        self.devices
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Finds a station by name or MAC address.
    ///
    /// `None` or an empty selector picks the first station. MAC addresses compare
    /// case-insensitively and accept `-` as separator.
    pub fn station(&self, selector: Option<&str>) -> Option<&Device> {
        let selector = match selector.map(str::trim) {
            None | Some("") => return self.devices.first(),
            Some(selector) => selector,
        };
        if is_mac_address(selector) {
            let wanted = normalize_mac(selector);
            return self.devices.iter().find(|d| normalize_mac(&d.id) == wanted);
        }
        self.devices.iter().find(|d| {
            d.station_name.as_deref() == Some(selector) || d.id.eq_ignore_ascii_case(selector)
        })
    }

    /// Finds the station's base module or an attached module by name or id.
    pub fn module(&self, name: &str, station: Option<&str>) -> Option<ModuleRef<'_>> {
        let device = self.station(station)?;
        if device.name.as_deref() == Some(name) || device.id.eq_ignore_ascii_case(name) {
            return Some(ModuleRef::Station(device));
        }
        device
            .modules
            .iter()
            .find(|m| m.name.as_deref() == Some(name) || m.id.eq_ignore_ascii_case(name))
            .map(ModuleRef::Module)
    }
}

/// `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`.
pub fn is_mac_address(candidate: &str) -> bool {
    let groups: Vec<&str> = candidate.split([':', '-']).collect();
    groups.len() == 6
        && groups
            .iter()
            .all(|g| g.len() == 2 && g.chars().all(|c| c.is_ascii_hexdigit()))
}

fn normalize_mac(mac: &str) -> String {
    mac.to_ascii_lowercase().replace('-', ":")
}

fn convert_device(index: usize, raw: RawDevice) -> Result<Device, DataError> {
    let id = raw
        .id
        .filter(|id| !id.is_empty())
        .ok_or(DataError::MissingDeviceId { index })?;
    let modules = raw
        .modules
        .into_iter()
        .enumerate()
        .map(|(module_index, module)| convert_module(&id, module_index, module))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Device {
        name: raw.module_name,
        station_name: raw.station_name,
        device_type: raw.device_type.unwrap_or_default(),
        date_setup: optional_time(raw.date_setup)?,
        last_setup: optional_time(raw.last_setup)?,
        data_types: metrics(&raw.data_type),
        last_measured: last_measured(raw.dashboard_data.as_ref())?,
        modules,
        id,
    })
}

fn convert_module(device_id: &str, index: usize, raw: RawModule) -> Result<Module, DataError> {
    let id = raw
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DataError::MissingModuleId {
            device_id: device_id.to_string(),
            index,
        })?;
    Ok(Module {
        id,
        name: raw.module_name,
        module_type: raw.module_type.unwrap_or_default(),
        battery_level: raw.battery_percent,
        rf_status: raw.rf_status,
        last_setup: optional_time(raw.last_setup)?,
        data_types: metrics(&raw.data_type),
        last_measured: last_measured(raw.dashboard_data.as_ref())?,
        device_id: device_id.to_string(),
    })
}

fn metrics(names: &[String]) -> Vec<Metric> {
    names.iter().filter_map(|n| Metric::from_api_name(n)).collect()
}

fn optional_time(seconds: Option<i64>) -> Result<Option<DateTime<Utc>>, DataError> {
    seconds.map(from_unix).transpose()
}

fn last_measured(dashboard: Option<&RawDashboard>) -> Result<Option<DateTime<Utc>>, DataError> {
    optional_time(dashboard.and_then(|d| d.time_utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::schema::StationDataEnvelope;
    use crate::transport::mock::station_data_body;
    use crate::types::device::EntityKind;

    fn registry() -> StationRegistry {
        let envelope: StationDataEnvelope =
            serde_json::from_value(station_data_body()).unwrap();
        StationRegistry::build(envelope.body.devices).unwrap()
    }

    fn raw_device(id: Option<&str>) -> RawDevice {
        serde_json::from_value(serde_json::json!({ "_id": id, "station_name": "x" })).unwrap()
    }

    #[test]
    fn test_build_links_modules_to_device() {
        let registry = registry();
        let device = &registry.devices()[0];
        assert_eq!(device.id, "70:ee:50:aa:aa:aa");
        assert_eq!(device.station_name.as_deref(), Some("Maison"));
        assert!(device.is_station());
        assert_eq!(device.data_types.len(), 5);
        assert_eq!(device.last_measured, Some(from_unix(1_599_999_700).unwrap()));

        let module = &device.modules[0];
        assert_eq!(module.device_id, device.id);
        assert_eq!(module.battery_level, Some(76));
        assert_eq!(module.rf_status, Some(68));
        assert_eq!(
            module.data_types,
            vec![Metric::Temperature, Metric::Co2, Metric::Humidity]
        );
    }

    #[test]
    fn test_build_rejects_device_without_id() {
        let devices = vec![raw_device(Some("70:ee:50:00:00:01")), raw_device(None)];
        let result = StationRegistry::build(devices);
        assert!(matches!(result, Err(DataError::MissingDeviceId { index: 1 })));
    }

    #[test]
    fn test_build_rejects_module_without_id() {
        let raw: RawDevice = serde_json::from_value(serde_json::json!({
            "_id": "70:ee:50:00:00:01",
            "modules": [{ "module_name": "nameless" }]
        }))
        .unwrap();
        assert!(matches!(
            StationRegistry::build(vec![raw]),
            Err(DataError::MissingModuleId { index: 0, .. })
        ));
    }

    #[test]
    fn test_build_keeps_provider_order() {
        let registry = StationRegistry::build(vec![
            raw_device(Some("70:ee:50:00:00:02")),
            raw_device(Some("70:ee:50:00:00:01")),
        ])
        .unwrap();
        let ids: Vec<&str> = registry.devices().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["70:ee:50:00:00:02", "70:ee:50:00:00:01"]);
    }

    #[test]
    fn test_station_lookup() {
        let registry = registry();
        assert!(registry.station(None).is_some());
        assert!(registry.station(Some("")).is_some());
        assert!(registry.station(Some("Maison")).is_some());
        assert!(registry.station(Some("70-EE-50-AA-AA-AA")).is_some());
        assert!(registry.station(Some("70:ee:50:00:00:00")).is_none());
        assert!(registry.station(Some("Chalet")).is_none());
    }

    #[test]
    fn test_module_lookup() {
        let registry = registry();
        let base = registry.module("Salon", None).unwrap();
        assert_eq!(base.entity().kind, EntityKind::Device);
        let indoor = registry.module("Chambre", Some("Maison")).unwrap();
        assert_eq!(indoor.entity().id(), "03:00:00:bb:bb:bb");
        assert!(registry.module("Jardin", None).is_none());
    }

    #[test]
    fn test_mac_detection() {
        assert!(is_mac_address("70:ee:50:09:f0:aa"));
        assert!(is_mac_address("70-EE-50-09-F0-AA"));
        assert!(!is_mac_address("70:ee:50:09:f0"));
        assert!(!is_mac_address("Maison"));
    }
}
