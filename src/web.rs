//! Axum-based HTTP server for the renter and manage APIs
//!
//! Two surfaces share one router: the capability-coded renter API under
//! `/api/{code}` and the operator API under `/manage/api`. Handlers return
//! [`ApiError`] so failures map to consistent JSON error bodies.

pub mod manage;
pub mod metrics;
pub mod public;

use crate::config::Config;
use crate::error::FiacreError;
use crate::fetch::Fetcher;
use crate::ops::VehicleOps;
use crate::registry::VehicleRegistry;
use crate::scheduler::BoundaryScheduler;
use crate::stats::StatsProjector;
use crate::store::{CredentialStore, RentalStore, SnapshotStore, VehicleStore};
use crate::tokens::TokenStore;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub credentials: CredentialStore,
    pub vehicles: VehicleStore,
    pub rentals: RentalStore,
    pub snapshots: SnapshotStore,
    pub tokens: Arc<TokenStore>,
    pub registry: Arc<VehicleRegistry>,
    pub fetcher: Arc<Fetcher>,
    pub ops: Arc<VehicleOps>,
    pub scheduler: Arc<BoundaryScheduler>,
    pub stats: Arc<StatsProjector>,
}

/// Handler-level failure. The renter surface deliberately answers an
/// unknown or inactive capability code with a plain 404.
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Internal(FiacreError),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<FiacreError> for ApiError {
    fn from(e: FiacreError) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
            }
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
            }
            ApiError::Internal(e) => {
                let status = match &e {
                    FiacreError::Api { .. } => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, Json(json!({"error": e.to_string()}))).into_response()
            }
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/{code}", get(public::info))
        .route("/api/{code}/hvacStart", post(public::hvac_start))
        .route("/api/{code}/hvacStop", post(public::hvac_stop))
        .route(
            "/api/{code}/hvac/temperature/{tenths}",
            post(public::hvac_set_temperature),
        )
        .route("/api/{code}/lock", post(public::lock))
        .route("/api/{code}/unlock", post(public::unlock))
        .route("/api/{code}/frunk", post(public::frunk))
        .route("/manage/api/ping", get(manage::ping))
        .route("/manage/api/metrics", get(metrics::metrics))
        .route(
            "/manage/api/rentals",
            get(manage::list_rentals).post(manage::add_rental),
        )
        .route(
            "/manage/api/rentals/{id}",
            axum::routing::put(manage::update_rental).delete(manage::delete_rental),
        )
        .route("/manage/api/credentials", get(manage::list_credentials))
        .route("/manage/api/credentials/beginAuth", post(manage::begin_auth))
        .route(
            "/manage/api/credentials/completeAuth",
            post(manage::complete_auth),
        )
        .route(
            "/manage/api/credentials/{id}/refresh",
            post(manage::refresh_credentials),
        )
        .route(
            "/manage/api/credentials/{id}",
            delete(manage::delete_credentials),
        )
        .route("/manage/api/vehicles", get(manage::list_vehicles))
        .route(
            "/manage/api/vehicles/loadVehicles",
            post(manage::load_vehicles),
        )
        .route(
            "/manage/api/vehicles/{id}/lockVehicle",
            post(manage::lock_vehicle),
        )
        .route(
            "/manage/api/vehicles/{id}/unlockVehicle",
            post(manage::unlock_vehicle),
        )
        .route(
            "/manage/api/vehicles/{id}/valetModeEnable",
            post(manage::valet_mode_enable),
        )
        .route(
            "/manage/api/vehicles/{id}/valetModeDisable",
            post(manage::valet_mode_disable),
        )
        .route(
            "/manage/api/vehicles/{id}/speedLimitModeDisable",
            post(manage::speed_limit_mode_disable),
        )
        .route(
            "/manage/api/vehicles/{id}/chargeStatsData/{offset}/{limit}",
            get(manage::charge_stats_data),
        )
        .route(
            "/manage/api/vehicles/{id}/dailyStatsData/{offset}/{limit}",
            get(manage::daily_stats_data),
        )
        .route(
            "/manage/api/vehicles/{id}/rawData/{offset}/{limit}",
            get(manage::raw_data),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let router = build_router(state);

    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let (addr, parsed_ok): (SocketAddr, bool) = match host.parse::<IpAddr>() {
        Ok(ip) => (SocketAddr::new(ip, port), true),
        Err(_) => (([127, 0, 0, 1], port).into(), false),
    };
    if !parsed_ok {
        logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{} (renter /api, manage /manage/api)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router).await?;
    Ok(())
}
