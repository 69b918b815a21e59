//! Renter-facing handlers, scoped by the per-rental capability code
//!
//! Every route resolves the code first and answers 404 when it is unknown.
//! Command routes additionally require the rental to be active right now,
//! so a code stops working the moment the rental window closes.

use super::{ApiError, ApiResult, AppState};
use crate::logging::get_logger;
use crate::store::rentals::RentalRow;
use crate::store::vehicles::VehicleRow;
use crate::tesla::{StateSection, Trunk, VehicleCommand};
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

const SNAPSHOT_SECTIONS: [(&str, &str); 5] = [
    ("chargeState", "charge_state"),
    ("driveState", "drive_state"),
    ("vehicleState", "vehicle_state"),
    ("climateSettings", "climate_state"),
    ("uiSettings", "gui_settings"),
];

fn rental_for(state: &AppState, code: &str) -> ApiResult<RentalRow> {
    state.rentals.get_by_code(code)?.ok_or(ApiError::NotFound)
}

/// A rental only grants access while its vehicle is still linked, owned
/// and mobile-enabled. Anything less reads as an unknown code.
fn active_vehicle(state: &AppState, rental: &RentalRow) -> ApiResult<VehicleRow> {
    let vehicle_id = rental.vehicle_id.ok_or(ApiError::NotFound)?;
    let vehicle = state.vehicles.get(vehicle_id)?.ok_or(ApiError::NotFound)?;
    if !vehicle.is_active() {
        return Err(ApiError::NotFound);
    }
    Ok(vehicle)
}

fn snapshot_section(state: &AppState, vehicle_id: i64, section: &str) -> ApiResult<Value> {
    let value = state
        .snapshots
        .latest(vehicle_id)?
        .and_then(|s| s.data.get(section).cloned())
        .unwrap_or(Value::Null);
    Ok(value)
}

pub async fn info(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Value>> {
    let rental = rental_for(&state, &code)?;
    let vehicle = if rental.is_current(Utc::now()) {
        active_vehicle(&state, &rental).ok()
    } else {
        None
    };
    let mut body = json!({
        "rental": {
            "start": rental.start_at,
            "end": rental.end_at,
            "isActive": vehicle.is_some(),
            "odometerStart": rental.odometer_start,
        }
    });

    if let Some(vehicle) = vehicle {
        // Refresh opportunistically; a failing poll still leaves the
        // last stored snapshot to serve.
        if let Err(e) = state.fetcher.fetch_vehicle(&vehicle, false).await {
            get_logger("web").debug(&format!(
                "renter info fetch failed for vehicle {}: {}",
                vehicle.id, e
            ));
        }
        if let Some(snapshot) = state.snapshots.latest(vehicle.id)? {
            for (key, section) in SNAPSHOT_SECTIONS {
                body[key] = snapshot.data.get(section).cloned().unwrap_or(Value::Null);
            }
        }
    }

    Ok(Json(body))
}

/// Run one command for an active rental and answer with the freshly
/// stored snapshot section the command affects. Documents that come back
/// without the sub-key fall through to the granular endpoint.
async fn command_response(
    state: &AppState,
    code: &str,
    command: VehicleCommand,
    response_key: &str,
    section: StateSection,
) -> ApiResult<Json<Value>> {
    let rental = rental_for(state, code)?;
    if !rental.is_current(Utc::now()) {
        return Err(ApiError::NotFound);
    }
    let vehicle = active_vehicle(state, &rental)?;
    state.ops.execute(&vehicle, &command).await?;
    let mut fresh = snapshot_section(state, vehicle.id, section.as_path())?;
    if fresh.is_null() {
        fresh = state
            .ops
            .read_section(&vehicle, section)
            .await
            .unwrap_or(Value::Null);
    }
    Ok(Json(json!({ response_key: fresh })))
}

pub async fn hvac_start(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Value>> {
    command_response(
        &state,
        &code,
        VehicleCommand::HvacStart,
        "climateSettings",
        StateSection::Climate,
    )
    .await
}

pub async fn hvac_stop(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Value>> {
    command_response(
        &state,
        &code,
        VehicleCommand::HvacStop,
        "climateSettings",
        StateSection::Climate,
    )
    .await
}

/// Temperature arrives in tenths of a degree Celsius so the path stays
/// integer-only. Driver and passenger share the one value.
pub async fn hvac_set_temperature(
    State(state): State<AppState>,
    Path((code, tenths)): Path<(String, i64)>,
) -> ApiResult<Json<Value>> {
    let degrees = tenths as f64 / 10.0;
    command_response(
        &state,
        &code,
        VehicleCommand::SetTemps {
            driver: degrees,
            passenger: degrees,
        },
        "climateSettings",
        StateSection::Climate,
    )
    .await
}

pub async fn lock(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Value>> {
    command_response(
        &state,
        &code,
        VehicleCommand::DoorLock,
        "vehicleState",
        StateSection::Vehicle,
    )
    .await
}

pub async fn unlock(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Value>> {
    command_response(
        &state,
        &code,
        VehicleCommand::DoorUnlock,
        "vehicleState",
        StateSection::Vehicle,
    )
    .await
}

pub async fn frunk(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Value>> {
    command_response(
        &state,
        &code,
        VehicleCommand::ActuateTrunk {
            which: Trunk::Front,
        },
        "vehicleState",
        StateSection::Vehicle,
    )
    .await
}
