//! Operator API: rentals, credentials, vehicles and per-vehicle statistics

use super::{ApiError, ApiResult, AppState};
use crate::logging::get_logger;
use crate::stats::round2;
use crate::store::credentials::CredentialRow;
use crate::store::rentals::{NewRental, RentalRow};
use crate::telemetry::StateDocument;
use crate::tesla::auth;
use crate::tesla::VehicleCommand;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

pub async fn ping(State(state): State<AppState>) -> Json<Value> {
    state.scheduler.ensure_running();
    Json(json!({"initialized_at": state.scheduler.initialized_at()}))
}

#[derive(Debug, Serialize)]
pub struct RentalView {
    pub id: i64,
    pub vehicle_id: Option<i64>,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub code: String,
    pub is_active: bool,
    pub odometer_start: Option<f64>,
    pub odometer_start_measured_at: Option<DateTime<Utc>>,
    pub odometer_end: Option<f64>,
    pub odometer_end_measured_at: Option<DateTime<Utc>>,
    pub distance_driven: Option<f64>,
    pub price_brutto: Option<f64>,
    pub price_netto: Option<f64>,
    pub price_charging: Option<f64>,
}

impl RentalView {
    fn from_row(rental: &RentalRow, now: DateTime<Utc>, vehicle_active: bool) -> Self {
        Self {
            id: rental.id,
            vehicle_id: rental.vehicle_id,
            description: rental.description.clone(),
            start: rental.start_at,
            end: rental.end_at,
            code: rental.code.clone(),
            is_active: rental.is_current(now) && vehicle_active,
            odometer_start: rental.odometer_start,
            odometer_start_measured_at: rental.odometer_start_measured_at,
            odometer_end: rental.odometer_end,
            odometer_end_measured_at: rental.odometer_end_measured_at,
            distance_driven: rental.distance_driven(),
            price_brutto: rental.price_brutto,
            price_netto: rental.price_netto,
            price_charging: rental.price_charging,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RentalBody {
    pub vehicle_id: Option<i64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub price_brutto: Option<f64>,
    pub price_netto: Option<f64>,
    pub price_charging: Option<f64>,
}

/// Earnings over all rentals that carry both a net price and a driven
/// distance. Charging costs are deducted from the net sum and reported
/// separately.
fn earnings_totals(rentals: &[RentalRow]) -> Value {
    let mut netto_paid = 0.0;
    let mut charging_paid = 0.0;
    let mut distance_paid = 0.0;
    for rental in rentals {
        let netto = rental.price_netto.unwrap_or(0.0);
        let distance = rental.distance_driven().unwrap_or(0.0);
        if netto != 0.0 && distance != 0.0 {
            netto_paid += netto;
            if let Some(charging) = rental.price_charging.filter(|c| *c != 0.0) {
                netto_paid -= charging;
                charging_paid += charging;
            }
            distance_paid += distance;
        }
    }
    let earnings_per_km = if distance_paid != 0.0 {
        round2(netto_paid / distance_paid)
    } else {
        0.0
    };

    json!({
        "distance_driven_all": rentals.iter().filter_map(RentalRow::distance_driven).sum::<f64>(),
        "distance_driven_paid": distance_paid,
        "price_brutto": rentals.iter().filter_map(|r| r.price_brutto).sum::<f64>(),
        "price_netto": rentals.iter().filter_map(|r| r.price_netto).sum::<f64>(),
        "price_charging_all": round2(rentals.iter().filter_map(|r| r.price_charging).sum::<f64>()),
        "price_charging_paid": round2(charging_paid),
        "earnings_per_km": earnings_per_km,
    })
}

fn vehicle_is_active(state: &AppState, vehicle_id: Option<i64>) -> ApiResult<bool> {
    let Some(id) = vehicle_id else {
        return Ok(false);
    };
    Ok(state.vehicles.get(id)?.is_some_and(|v| v.is_active()))
}

pub async fn list_rentals(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let rentals = state.rentals.list()?;
    let now = Utc::now();
    let mut views = Vec::with_capacity(rentals.len());
    for rental in &rentals {
        let vehicle_active = vehicle_is_active(&state, rental.vehicle_id)?;
        views.push(RentalView::from_row(rental, now, vehicle_active));
    }
    let totals = earnings_totals(&rentals);
    Ok(Json(json!({"rentals": views, "totals": totals})))
}

fn next_full_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    truncated + Duration::hours(1)
}

fn validate_rental(
    state: &AppState,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    vehicle_id: Option<i64>,
) -> ApiResult<()> {
    if end_at <= start_at {
        return Err(ApiError::BadRequest("end must be after start".to_string()));
    }
    if let Some(vehicle_id) = vehicle_id
        && state.vehicles.get(vehicle_id)?.is_none()
    {
        return Err(ApiError::BadRequest(format!(
            "vehicle {} does not exist",
            vehicle_id
        )));
    }
    Ok(())
}

/// Omitted fields default to the next full hour, a one day duration and
/// the single active vehicle when there is exactly one.
pub async fn add_rental(
    State(state): State<AppState>,
    body: Option<Json<RentalBody>>,
) -> ApiResult<Json<RentalView>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let logger = get_logger("manage");

    let active = state.vehicles.list_active()?;
    if active.is_empty() {
        logger.warn("Cannot add rental, there is no active vehicle");
        return Err(ApiError::BadRequest(
            "there is no active vehicle".to_string(),
        ));
    }

    let now = Utc::now();
    let start_at = body.start.unwrap_or_else(|| next_full_hour(now));
    let end_at = body.end.unwrap_or(start_at + Duration::days(1));
    let vehicle_id = body
        .vehicle_id
        .or_else(|| (active.len() == 1).then(|| active[0].id));
    validate_rental(&state, start_at, end_at, vehicle_id)?;

    let mut rental = state.rentals.create(&NewRental {
        vehicle_id,
        start_at,
        end_at,
        description: body.description.clone().unwrap_or_default(),
        code: Uuid::new_v4().to_string(),
    })?;

    if body.price_brutto.is_some() || body.price_netto.is_some() || body.price_charging.is_some() {
        rental.price_brutto = body.price_brutto;
        rental.price_netto = body.price_netto;
        rental.price_charging = body.price_charging;
        state.rentals.save(&rental)?;
    }

    logger.info(&format!("rental {} created", rental.id));
    state.scheduler.ensure_running();
    let vehicle_active = vehicle_is_active(&state, rental.vehicle_id)?;
    Ok(Json(RentalView::from_row(&rental, now, vehicle_active)))
}

pub async fn update_rental(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<RentalBody>,
) -> ApiResult<Json<RentalView>> {
    let mut rental = state.rentals.get(id)?.ok_or(ApiError::NotFound)?;
    if body.vehicle_id.is_some() {
        rental.vehicle_id = body.vehicle_id;
    }
    if let Some(start) = body.start {
        rental.start_at = start;
    }
    if let Some(end) = body.end {
        rental.end_at = end;
    }
    if let Some(description) = body.description {
        rental.description = description;
    }
    if body.price_brutto.is_some() {
        rental.price_brutto = body.price_brutto;
    }
    if body.price_netto.is_some() {
        rental.price_netto = body.price_netto;
    }
    if body.price_charging.is_some() {
        rental.price_charging = body.price_charging;
    }
    validate_rental(&state, rental.start_at, rental.end_at, rental.vehicle_id)?;
    state.rentals.save(&rental)?;
    state.scheduler.ensure_running();
    let vehicle_active = vehicle_is_active(&state, rental.vehicle_id)?;
    Ok(Json(RentalView::from_row(&rental, Utc::now(), vehicle_active)))
}

pub async fn delete_rental(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    if !state.rentals.delete(id)? {
        return Err(ApiError::NotFound);
    }
    get_logger("manage").info(&format!("rental {} deleted", id));
    state.scheduler.ensure_running();
    Ok(Json(json!({"ok": true})))
}

#[derive(Debug, Serialize)]
pub struct CredentialView {
    pub id: i64,
    pub email: String,
    pub token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CredentialRow> for CredentialView {
    fn from(row: &CredentialRow) -> Self {
        Self {
            id: row.id,
            email: row.email.clone(),
            token_expires_at: row.token_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub async fn list_credentials(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let credentials: Vec<CredentialView> = state
        .credentials
        .list()?
        .iter()
        .map(CredentialView::from)
        .collect();
    Ok(Json(json!({"credentials": credentials})))
}

#[derive(Debug, Deserialize)]
pub struct BeginAuthBody {
    pub email: String,
}

/// First authorization step. Stateless: the caller keeps the verifier
/// and sends it back together with the code from the OAuth redirect.
pub async fn begin_auth(
    State(state): State<AppState>,
    Json(body): Json<BeginAuthBody>,
) -> ApiResult<Json<Value>> {
    if body.email.is_empty() {
        return Err(ApiError::BadRequest("email is required".to_string()));
    }
    let code_verifier = auth::generate_code_verifier();
    let oauth_state = auth::generate_state();
    let auth_url = auth::authorize_url(
        &state.config.tesla.auth_host,
        &auth::code_challenge(&code_verifier),
        &oauth_state,
        &body.email,
    );
    Ok(Json(json!({
        "auth_url": auth_url,
        "state": oauth_state,
        "code_verifier": code_verifier,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CompleteAuthBody {
    pub email: String,
    pub code: String,
    pub code_verifier: String,
}

pub async fn complete_auth(
    State(state): State<AppState>,
    Json(body): Json<CompleteAuthBody>,
) -> ApiResult<Json<CredentialView>> {
    let credential = state
        .tokens
        .login(&body.email, &body.code, &body.code_verifier)
        .await?;
    get_logger("manage").info(&format!("credentials {} authorized", credential.email));
    state
        .registry
        .sync_account(&credential, state.config.tesla.allow_wakeup)
        .await?;
    Ok(Json(CredentialView::from(&credential)))
}

pub async fn refresh_credentials(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let credential = state.credentials.get(id)?.ok_or(ApiError::NotFound)?;
    state.tokens.refresh(&credential).await?;
    Ok(Json(json!({"ok": true})))
}

pub async fn delete_credentials(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    if !state.credentials.delete(id)? {
        return Err(ApiError::NotFound);
    }
    let logger = get_logger("manage");
    logger.info(&format!("credentials {} deleted", id));
    for vehicle in state.vehicles.list_linked_without_credentials()? {
        logger.info(&format!(
            "unlinking vehicle {} after credentials removal",
            vehicle.id
        ));
        state.vehicles.unlink(vehicle.id)?;
    }
    Ok(Json(json!({"ok": true})))
}

pub async fn list_vehicles(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mut items = Vec::new();
    for vehicle in state.vehicles.list()? {
        let latest_data = state
            .snapshots
            .latest_with_charge_data(vehicle.id)?
            .and_then(|snapshot| {
                let doc = StateDocument::from_value(&snapshot.data).ok()?;
                Some(json!({
                    "captured_at": snapshot.captured_at,
                    "state": snapshot.data.get("state").cloned().unwrap_or(Value::Null),
                    "battery_level": doc.battery_level(),
                    "odometer": doc.local_odometer(),
                }))
            });
        items.push(json!({
            "id": vehicle.id,
            "remote_id": vehicle.remote_id,
            "vehicle_id": vehicle.vehicle_id,
            "display_name": vehicle.display_name,
            "model": vehicle.model,
            "color": vehicle.color,
            "vin": vehicle.vin,
            "state": vehicle.state,
            "mobile_enabled": vehicle.mobile_enabled,
            "linked": vehicle.linked,
            "credentials_id": vehicle.credentials_id,
            "is_active": vehicle.is_active(),
            "latest_data": latest_data,
        }));
    }
    Ok(Json(json!({"vehicles": items})))
}

/// Reconcile every account's vehicle list, waking vehicles for full state
/// unless wakeups are disabled in the configuration.
pub async fn load_vehicles(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    get_logger("manage").warn("update_vehicles");
    state
        .registry
        .sync_all(state.config.tesla.allow_wakeup)
        .await?;
    Ok(Json(json!({"ok": true})))
}

async fn vehicle_action(
    state: &AppState,
    vehicle_id: i64,
    action: &str,
    command: VehicleCommand,
) -> ApiResult<Json<Value>> {
    get_logger("manage").warn(&format!("{} vehicle={}", action, vehicle_id));
    let vehicle = state.vehicles.get(vehicle_id)?.ok_or(ApiError::NotFound)?;
    let result = state.ops.execute(&vehicle, &command).await?;
    Ok(Json(result))
}

pub async fn lock_vehicle(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    vehicle_action(&state, id, "lock_vehicle", VehicleCommand::DoorLock).await
}

pub async fn unlock_vehicle(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    vehicle_action(&state, id, "unlock_vehicle", VehicleCommand::DoorUnlock).await
}

#[derive(Debug, Deserialize)]
pub struct ValetBody {
    pub pin: String,
}

pub async fn valet_mode_enable(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ValetBody>,
) -> ApiResult<Json<Value>> {
    if body.pin.len() != 4 || !body.pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::BadRequest("pin must be 4 digits".to_string()));
    }
    vehicle_action(
        &state,
        id,
        "valet_mode_enable",
        VehicleCommand::EnableValetMode { pin: body.pin },
    )
    .await
}

pub async fn valet_mode_disable(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    vehicle_action(&state, id, "valet_mode_disable", VehicleCommand::DisableValetMode).await
}

pub async fn speed_limit_mode_disable(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    vehicle_action(
        &state,
        id,
        "speed_limit_mode_disable",
        VehicleCommand::SpeedLimitDeactivate,
    )
    .await
}

pub async fn charge_stats_data(
    State(state): State<AppState>,
    Path((id, offset, limit)): Path<(i64, u32, u32)>,
) -> ApiResult<Json<Value>> {
    let items = state.stats.charge_series(id, offset, limit)?;
    Ok(Json(json!({"items": items})))
}

pub async fn daily_stats_data(
    State(state): State<AppState>,
    Path((id, offset, limit)): Path<(i64, u32, u32)>,
) -> ApiResult<Json<Value>> {
    let items = state.stats.daily_rollup(id, offset, limit)?;
    Ok(Json(json!({"items": items})))
}

pub async fn raw_data(
    State(state): State<AppState>,
    Path((id, offset, limit)): Path<(i64, u32, u32)>,
) -> ApiResult<Json<Value>> {
    let items = state.stats.raw_diffs(id, offset, limit)?;
    Ok(Json(json!({"items": items})))
}
