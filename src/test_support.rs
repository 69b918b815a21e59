//! Scripted API double shared by unit tests

use crate::error::{FiacreError, Result};
use crate::tesla::{StateSection, TokenPair, VehicleApi, VehicleCommand, VehicleListing};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn listing_entry(remote_id: i64, stable_id: i64, state: &str) -> Value {
    json!({
        "id": remote_id,
        "vehicle_id": stable_id,
        "vin": "5YJSA1CN5CFP01657",
        "display_name": "Middle Earth",
        "color": null,
        "state": state,
        "option_codes": "AD15,AF00,APF0",
    })
}

/// Full state document the way an online Model S reports it.
pub fn vehicle_data_doc(odometer_miles: f64, battery_level: i64) -> Value {
    json!({
        "id": 321,
        "vehicle_id": 1234567890,
        "state": "online",
        "charge_state": {
            "battery_level": battery_level,
            "battery_range": 220.5,
            "est_battery_range": 205.1,
            "ideal_battery_range": 250.0,
            "charging_state": "Disconnected",
            "charge_limit_soc": 90,
            "charge_port_door_open": false,
        },
        "drive_state": {
            "speed": null,
            "latitude": 47.38,
            "longitude": 8.54,
            "heading": 194,
            "gps_as_of": 1538363883,
        },
        "vehicle_state": {
            "odometer": odometer_miles,
            "locked": true,
            "df": 0, "pf": 0, "dr": 0, "pr": 0, "ft": 0, "rt": 0,
            "car_version": "2019.40.50.7",
        },
        "climate_state": {
            "inside_temp": 18.2,
            "outside_temp": 11.5,
            "driver_temp_setting": 21.0,
            "passenger_temp_setting": 21.0,
            "is_climate_on": false,
        },
        "gui_settings": {
            "gui_distance_units": "km/hr",
            "gui_temperature_units": "C",
        },
        "vehicle_config": {
            "car_type": "models2",
            "exterior_color": "white",
        },
    })
}

type ScriptedData = HashMap<i64, VecDeque<std::result::Result<Value, String>>>;

/// Owner API double. Responses are scripted per remote id; anything not
/// scripted behaves like a sleeping car (408).
#[derive(Default)]
pub struct MockApi {
    listings: Mutex<Vec<Value>>,
    wake_states: Mutex<VecDeque<String>>,
    mobile_enabled: Mutex<bool>,
    data: Mutex<ScriptedData>,
    pub commands: Mutex<Vec<(i64, String)>>,
    pub list_calls: AtomicUsize,
    pub wake_calls: AtomicUsize,
    pub data_calls: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            mobile_enabled: Mutex::new(true),
            ..Self::default()
        }
    }

    pub fn set_listing(&self, entries: Vec<Value>) {
        *self.listings.lock() = entries;
    }

    pub fn set_mobile_enabled(&self, enabled: bool) {
        *self.mobile_enabled.lock() = enabled;
    }

    /// Next wake_up call reports this state. Unscripted calls report online.
    pub fn queue_wake_state(&self, state: &str) {
        self.wake_states.lock().push_back(state.to_string());
    }

    pub fn push_data(&self, remote_id: i64, doc: Value) {
        self.data.lock().entry(remote_id).or_default().push_back(Ok(doc));
    }

    pub fn push_data_error(&self, remote_id: i64, message: &str) {
        self.data
            .lock()
            .entry(remote_id)
            .or_default()
            .push_back(Err(message.to_string()));
    }

    pub fn command_endpoints(&self) -> Vec<String> {
        self.commands.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    fn unavailable(remote_id: i64) -> FiacreError {
        FiacreError::api(
            format!("/api/1/vehicles/{}/vehicle_data", remote_id),
            "returned 408 (vehicle unavailable)".to_string(),
        )
    }
}

#[async_trait::async_trait]
impl VehicleApi for MockApi {
    async fn exchange_code(&self, _code: &str, _verifier: &str) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: "abc1234".to_string(),
            refresh_token: "cba321".to_string(),
            expires_in: 7_776_000,
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: "abc9999".to_string(),
            refresh_token: "cba999".to_string(),
            expires_in: 3_888_000,
        })
    }

    async fn list_vehicles(&self, _access_token: &str) -> Result<Vec<VehicleListing>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .listings
            .lock()
            .clone()
            .into_iter()
            .map(VehicleListing)
            .collect())
    }

    async fn wake_up(&self, _access_token: &str, _remote_id: i64) -> Result<String> {
        self.wake_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .wake_states
            .lock()
            .pop_front()
            .unwrap_or_else(|| "online".to_string()))
    }

    async fn is_mobile_enabled(&self, _access_token: &str, _remote_id: i64) -> Result<bool> {
        Ok(*self.mobile_enabled.lock())
    }

    async fn vehicle_data(&self, _access_token: &str, remote_id: i64) -> Result<Value> {
        self.data_calls.fetch_add(1, Ordering::SeqCst);
        let mut scripted = self.data.lock();
        if let Some(queue) = scripted.get_mut(&remote_id)
            && let Some(next) = queue.pop_front()
        {
            return next.map_err(|message| {
                FiacreError::api(
                    format!("/api/1/vehicles/{}/vehicle_data", remote_id),
                    message,
                )
            });
        }
        Err(Self::unavailable(remote_id))
    }

    async fn state_section(
        &self,
        access_token: &str,
        remote_id: i64,
        section: StateSection,
    ) -> Result<Value> {
        let doc = self.vehicle_data(access_token, remote_id).await?;
        Ok(doc.get(section.as_path()).cloned().unwrap_or(Value::Null))
    }

    async fn command(
        &self,
        _access_token: &str,
        remote_id: i64,
        command: &VehicleCommand,
    ) -> Result<Value> {
        self.commands
            .lock()
            .push((remote_id, command.endpoint().to_string()));
        Ok(json!({"result": true, "reason": ""}))
    }

    async fn nearby_charging_sites(&self, _access_token: &str, _remote_id: i64) -> Result<Value> {
        Ok(json!({"congestion_sync_time_utc_secs": 0, "superchargers": []}))
    }
}
