//! Wire-level types for the owner API

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Result of a completed OAuth exchange. The access token belongs to the
/// owner API, the refresh token to the SSO host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// One entry of the account vehicle listing, kept as the raw document so
/// nothing the API adds over time is lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleListing(pub Value);

impl VehicleListing {
    /// Session-scoped id used for addressing commands.
    pub fn remote_id(&self) -> Option<i64> {
        self.0.get("id").and_then(Value::as_i64)
    }

    /// Stable id that survives API sessions.
    pub fn stable_id(&self) -> Option<i64> {
        self.0.get("vehicle_id").and_then(Value::as_i64)
    }

    pub fn vin(&self) -> Option<&str> {
        self.0.get("vin").and_then(Value::as_str)
    }

    pub fn display_name(&self) -> Option<&str> {
        self.0.get("display_name").and_then(Value::as_str)
    }

    pub fn state(&self) -> Option<&str> {
        self.0.get("state").and_then(Value::as_str)
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Granular state endpoints. Older firmware serves these even when the
/// full document comes back without the matching sub-key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSection {
    Charge,
    Drive,
    Climate,
    Vehicle,
    Gui,
    Config,
}

impl StateSection {
    pub fn as_path(&self) -> &'static str {
        match self {
            StateSection::Charge => "charge_state",
            StateSection::Drive => "drive_state",
            StateSection::Climate => "climate_state",
            StateSection::Vehicle => "vehicle_state",
            StateSection::Gui => "gui_settings",
            StateSection::Config => "vehicle_config",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trunk {
    Front,
    Rear,
}

impl Trunk {
    fn as_str(&self) -> &'static str {
        match self {
            Trunk::Front => "front",
            Trunk::Rear => "rear",
        }
    }
}

/// A command POSTed to `/api/1/vehicles/{id}/command/{endpoint}`.
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleCommand {
    HvacStart,
    HvacStop,
    SetTemps { driver: f64, passenger: f64 },
    SeatHeater { seat: u8, level: u8 },
    SteeringWheelHeater { on: bool },
    DoorLock,
    DoorUnlock,
    ActuateTrunk { which: Trunk },
    SetChargeLimit { percent: u8 },
    ChargePortDoorOpen,
    ChargePortDoorClose,
    ChargeStart,
    ChargeStop,
    NavigationRequest { address: String, locale: String },
    EnableValetMode { pin: String },
    DisableValetMode,
    SpeedLimitSetLimit { limit_mph: u32 },
    SpeedLimitActivate { pin: String },
    SpeedLimitDeactivate,
}

impl VehicleCommand {
    pub fn endpoint(&self) -> &'static str {
        match self {
            VehicleCommand::HvacStart => "auto_conditioning_start",
            VehicleCommand::HvacStop => "auto_conditioning_stop",
            VehicleCommand::SetTemps { .. } => "set_temps",
            VehicleCommand::SeatHeater { .. } => "remote_seat_heater_request",
            VehicleCommand::SteeringWheelHeater { .. } => "remote_steering_wheel_heater_request",
            VehicleCommand::DoorLock => "door_lock",
            VehicleCommand::DoorUnlock => "door_unlock",
            VehicleCommand::ActuateTrunk { .. } => "actuate_trunk",
            VehicleCommand::SetChargeLimit { .. } => "set_charge_limit",
            VehicleCommand::ChargePortDoorOpen => "charge_port_door_open",
            VehicleCommand::ChargePortDoorClose => "charge_port_door_close",
            VehicleCommand::ChargeStart => "charge_start",
            VehicleCommand::ChargeStop => "charge_stop",
            VehicleCommand::NavigationRequest { .. } => "navigation_request",
            VehicleCommand::EnableValetMode { .. } | VehicleCommand::DisableValetMode => {
                "set_valet_mode"
            }
            VehicleCommand::SpeedLimitSetLimit { .. } => "speed_limit_set_limit",
            VehicleCommand::SpeedLimitActivate { .. } => "speed_limit_activate",
            VehicleCommand::SpeedLimitDeactivate => "speed_limit_deactivate",
        }
    }

    /// Request body, if the endpoint takes one. Temperatures and speed
    /// limits go over the wire as strings, which is what the API expects.
    pub fn body(&self) -> Option<Value> {
        match self {
            VehicleCommand::SetTemps { driver, passenger } => Some(json!({
                "driver_temp": driver.to_string(),
                "passenger_temp": passenger.to_string(),
            })),
            VehicleCommand::SeatHeater { seat, level } => Some(json!({
                "heater": seat,
                "level": level,
            })),
            // The API toggles with distinct keys rather than one boolean
            VehicleCommand::SteeringWheelHeater { on: true } => Some(json!({"on": true})),
            VehicleCommand::SteeringWheelHeater { on: false } => Some(json!({"off": true})),
            VehicleCommand::ActuateTrunk { which } => Some(json!({
                "which_trunk": which.as_str(),
            })),
            VehicleCommand::SetChargeLimit { percent } => Some(json!({"percent": percent})),
            VehicleCommand::NavigationRequest { address, locale } => Some(json!({
                "type": "share_ext_content_raw",
                "timestamp_ms": chrono::Utc::now().timestamp_millis(),
                "locale": locale,
                "value": {"android.intent.extra.TEXT": address},
            })),
            VehicleCommand::EnableValetMode { pin } => Some(json!({
                "on": true,
                "password": pin,
            })),
            VehicleCommand::DisableValetMode => Some(json!({"on": false})),
            VehicleCommand::SpeedLimitSetLimit { limit_mph } => Some(json!({
                "limit_mph": limit_mph.to_string(),
            })),
            VehicleCommand::SpeedLimitActivate { pin } => Some(json!({"pin": pin})),
            _ => None,
        }
    }
}
