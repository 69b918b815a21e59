//! Typed view over raw vehicle-state documents
//!
//! Snapshots persist the remote API's state document verbatim. This module
//! parses the document into optional typed sections and derives the values the
//! rest of the crate needs. Distance and speed fields are API-native miles;
//! conversion happens exactly once, where a unit-bearing type is constructed.

use crate::error::Result;
use serde::{Deserialize, Serialize};

const MILES_TO_KM: f64 = 1.609_344;

/// Distance with an explicit unit, constructed only via conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance {
    km: f64,
}

impl Distance {
    pub fn from_miles(value: f64) -> Self {
        Self {
            km: value * MILES_TO_KM,
        }
    }

    pub fn from_km(value: f64) -> Self {
        Self { km: value }
    }

    pub fn km(self) -> f64 {
        self.km
    }

    pub fn miles(self) -> f64 {
        self.km / MILES_TO_KM
    }
}

/// Speed with an explicit unit, constructed only via conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Speed {
    kmh: f64,
}

impl Speed {
    pub fn from_mph(value: f64) -> Self {
        Self {
            kmh: value * MILES_TO_KM,
        }
    }

    pub fn from_kmh(value: f64) -> Self {
        Self { kmh: value }
    }

    pub fn kmh(self) -> f64 {
        self.kmh
    }

    pub fn mph(self) -> f64 {
        self.kmh / MILES_TO_KM
    }
}

/// The display unit a snapshot's distances should be reported in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnits {
    Kilometers,
    Miles,
    /// No gui_settings section present; values pass through unconverted
    Unknown,
}

/// Charge-related section of the state document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeState {
    pub battery_level: Option<f64>,
    pub battery_range: Option<f64>,
    pub est_battery_range: Option<f64>,
    pub ideal_battery_range: Option<f64>,
    pub charging_state: Option<String>,
    pub charge_limit_soc: Option<f64>,
    pub charge_port_door_open: Option<bool>,
}

/// Motion and position section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveState {
    pub speed: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub heading: Option<f64>,
    pub gps_as_of: Option<i64>,
}

/// Body and odometer section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleState {
    pub odometer: Option<f64>,
    pub locked: Option<bool>,
    pub df: Option<i64>,
    pub pf: Option<i64>,
    pub dr: Option<i64>,
    pub pr: Option<i64>,
    pub ft: Option<i64>,
    pub rt: Option<i64>,
    pub car_version: Option<String>,
}

/// Climate section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateState {
    pub inside_temp: Option<f64>,
    pub outside_temp: Option<f64>,
    pub driver_temp_setting: Option<f64>,
    pub passenger_temp_setting: Option<f64>,
    pub is_climate_on: Option<bool>,
}

/// Display-preference section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiSettings {
    pub gui_distance_units: Option<String>,
    pub gui_temperature_units: Option<String>,
}

/// Static configuration section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub car_type: Option<String>,
    pub exterior_color: Option<String>,
}

/// Parsed state document; every section is optional because degraded
/// snapshots and older firmware omit sections freely
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateDocument {
    pub state: Option<String>,
    pub charge_state: Option<ChargeState>,
    pub drive_state: Option<DriveState>,
    pub vehicle_state: Option<VehicleState>,
    pub climate_state: Option<ClimateState>,
    pub gui_settings: Option<GuiSettings>,
    pub vehicle_config: Option<VehicleConfig>,
}

impl StateDocument {
    /// Parse a raw snapshot blob
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// The unit distances should be displayed in, per the vehicle's own setting
    pub fn distance_units(&self) -> DistanceUnits {
        match self
            .gui_settings
            .as_ref()
            .and_then(|g| g.gui_distance_units.as_deref())
        {
            Some("km/hr") => DistanceUnits::Kilometers,
            Some(_) => DistanceUnits::Miles,
            None => DistanceUnits::Unknown,
        }
    }

    /// Odometer reading; the API reports miles
    pub fn odometer(&self) -> Option<Distance> {
        let raw = self.vehicle_state.as_ref()?.odometer?;
        Some(Distance::from_miles(raw))
    }

    /// Odometer in the vehicle's display unit. Unknown units pass the raw
    /// value through unconverted.
    pub fn local_odometer(&self) -> Option<f64> {
        Some(self.localize(self.odometer()?))
    }

    /// Current speed; the API reports mph, null while parked
    pub fn speed(&self) -> Option<Speed> {
        let raw = self.drive_state.as_ref()?.speed?;
        Some(Speed::from_mph(raw))
    }

    pub fn is_moving(&self) -> bool {
        self.speed().is_some_and(|s| s.mph() != 0.0)
    }

    pub fn is_locked(&self) -> Option<bool> {
        self.vehicle_state.as_ref()?.locked
    }

    pub fn is_online(&self) -> bool {
        self.state.as_deref() == Some("online")
    }

    pub fn charging_state(&self) -> Option<&str> {
        self.charge_state.as_ref()?.charging_state.as_deref()
    }

    pub fn is_charging(&self) -> bool {
        self.charging_state() == Some("Charging")
    }

    pub fn battery_level(&self) -> Option<f64> {
        self.charge_state.as_ref()?.battery_level
    }

    /// Rated "ideal" range; the API reports miles
    pub fn ideal_range(&self) -> Option<Distance> {
        let raw = self.charge_state.as_ref()?.ideal_battery_range?;
        Some(Distance::from_miles(raw))
    }

    fn localize(&self, distance: Distance) -> f64 {
        match self.distance_units() {
            DistanceUnits::Kilometers => distance.km(),
            DistanceUnits::Miles | DistanceUnits::Unknown => distance.miles(),
        }
    }

    pub fn local_battery_range(&self) -> Option<f64> {
        let raw = self.charge_state.as_ref()?.battery_range?;
        Some(self.localize(Distance::from_miles(raw)))
    }

    pub fn local_est_battery_range(&self) -> Option<f64> {
        let raw = self.charge_state.as_ref()?.est_battery_range?;
        Some(self.localize(Distance::from_miles(raw)))
    }

    pub fn local_ideal_battery_range(&self) -> Option<f64> {
        let raw = self.charge_state.as_ref()?.ideal_battery_range?;
        Some(self.localize(Distance::from_miles(raw)))
    }

    /// Battery energy estimate from ideal range and a tunable Wh/km factor
    pub fn battery_energy_kwh(&self, range_wh_per_km: f64) -> Option<f64> {
        Some(self.ideal_range()?.km() * range_wh_per_km / 1000.0)
    }

    /// Whether the document carries charge data (degraded snapshots do not)
    pub fn has_charge_data(&self) -> bool {
        self.battery_level().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_doc() -> serde_json::Value {
        json!({
            "state": "online",
            "charge_state": {
                "battery_level": 64,
                "battery_range": 195.5,
                "est_battery_range": 182.3,
                "ideal_battery_range": 221.8,
                "charging_state": "Disconnected",
            },
            "drive_state": {"speed": null, "latitude": 47.37, "longitude": 8.54},
            "vehicle_state": {"odometer": 25000.0, "locked": true},
            "climate_state": {"inside_temp": 21.5, "is_climate_on": false},
            "gui_settings": {"gui_distance_units": "km/hr"},
            "vehicle_config": {"car_type": "models", "exterior_color": "white"},
        })
    }

    #[test]
    fn test_parse_full_document() {
        let doc = StateDocument::from_value(&full_doc()).unwrap();
        assert!(doc.is_online());
        assert_eq!(doc.battery_level(), Some(64.0));
        assert_eq!(doc.is_locked(), Some(true));
        assert!(!doc.is_moving());
        assert!(!doc.is_charging());
        assert!(doc.has_charge_data());
    }

    #[test]
    fn test_parse_degraded_document() {
        let doc = StateDocument::from_value(&json!({
            "id": 321,
            "vehicle_id": 1234567890,
            "state": "asleep",
            "display_name": null,
        }))
        .unwrap();
        assert!(!doc.is_online());
        assert!(!doc.has_charge_data());
        assert_eq!(doc.local_odometer(), None);
        assert_eq!(doc.distance_units(), DistanceUnits::Unknown);
    }

    #[test]
    fn test_distance_conversion() {
        let d = Distance::from_miles(100.0);
        assert!((d.km() - 160.9344).abs() < 1e-9);
        assert!((d.miles() - 100.0).abs() < 1e-9);

        let d = Distance::from_km(160.9344);
        assert!((d.miles() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_local_odometer_metric_display() {
        let doc = StateDocument::from_value(&full_doc()).unwrap();
        assert_eq!(doc.distance_units(), DistanceUnits::Kilometers);
        let km = doc.local_odometer().unwrap();
        assert!((km - 25000.0 * 1.609_344).abs() < 1e-6);
    }

    #[test]
    fn test_local_odometer_unknown_units_passes_through() {
        let mut value = full_doc();
        value.as_object_mut().unwrap().remove("gui_settings");
        let doc = StateDocument::from_value(&value).unwrap();
        assert_eq!(doc.local_odometer(), Some(25000.0));
    }

    #[test]
    fn test_projection_is_stable_across_reads() {
        // Reading the same snapshot twice must not convert twice
        let doc = StateDocument::from_value(&full_doc()).unwrap();
        let first = doc.local_odometer().unwrap();
        let second = doc.local_odometer().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_is_moving() {
        let doc = StateDocument::from_value(&json!({
            "drive_state": {"speed": 55},
        }))
        .unwrap();
        assert!(doc.is_moving());

        let doc = StateDocument::from_value(&json!({
            "drive_state": {"speed": 0},
        }))
        .unwrap();
        assert!(!doc.is_moving());
    }

    #[test]
    fn test_battery_energy() {
        let doc = StateDocument::from_value(&full_doc()).unwrap();
        let kwh = doc.battery_energy_kwh(190.0).unwrap();
        let expected = 221.8 * 1.609_344 * 190.0 / 1000.0;
        assert!((kwh - expected).abs() < 1e-9);
    }
}
