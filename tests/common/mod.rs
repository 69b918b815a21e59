use fiacre::error::{FiacreError, Result};
use fiacre::tesla::{StateSection, TokenPair, VehicleApi, VehicleCommand, VehicleListing};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Remote API driven by a queue of scripted state documents. An empty queue
/// answers like a sleeping vehicle.
#[derive(Default)]
pub struct ScriptedApi {
    data: Mutex<VecDeque<Value>>,
    pub commands: Mutex<Vec<String>>,
    pub wake_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_data(&self, doc: Value) {
        self.data.lock().unwrap().push_back(doc);
    }
}

#[async_trait::async_trait]
impl VehicleApi for ScriptedApi {
    async fn exchange_code(&self, _code: &str, _code_verifier: &str) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: "scripted-access".to_string(),
            refresh_token: "scripted-refresh".to_string(),
            expires_in: 3600,
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: "scripted-access-2".to_string(),
            refresh_token: "scripted-refresh-2".to_string(),
            expires_in: 3600,
        })
    }

    async fn list_vehicles(&self, _access_token: &str) -> Result<Vec<VehicleListing>> {
        Ok(Vec::new())
    }

    async fn wake_up(&self, _access_token: &str, _remote_id: i64) -> Result<String> {
        self.wake_calls.fetch_add(1, Ordering::SeqCst);
        Ok("online".to_string())
    }

    async fn is_mobile_enabled(&self, _access_token: &str, _remote_id: i64) -> Result<bool> {
        Ok(true)
    }

    async fn vehicle_data(&self, _access_token: &str, remote_id: i64) -> Result<Value> {
        self.data.lock().unwrap().pop_front().ok_or_else(|| {
            FiacreError::api(
                format!("/api/1/vehicles/{}/vehicle_data", remote_id),
                "returned 408 (vehicle unavailable)".to_string(),
            )
        })
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
        _remote_id: i64,
        command: &VehicleCommand,
    ) -> Result<Value> {
        self.commands
            .lock()
            .unwrap()
            .push(command.endpoint().to_string());
        Ok(json!({"result": true, "reason": ""}))
    }

    async fn nearby_charging_sites(&self, _access_token: &str, _remote_id: i64) -> Result<Value> {
        Ok(json!({"superchargers": [], "destination_charging": []}))
    }
}

/// Full state document with a metric display setting, odometer in API miles.
pub fn state_doc(odometer_miles: f64, battery_level: i64) -> Value {
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
        },
        "drive_state": {"speed": null, "latitude": 47.37, "longitude": 8.54},
        "vehicle_state": {"odometer": odometer_miles, "locked": true},
        "climate_state": {"inside_temp": 18.2, "outside_temp": 11.5},
        "gui_settings": {"gui_distance_units": "km/hr", "gui_temperature_units": "C"},
        "vehicle_config": {"car_type": "models2", "exterior_color": "white"},
    })
}
