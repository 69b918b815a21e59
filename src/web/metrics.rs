//! Prometheus-style text metrics for the manage surface
//!
//! One line per fact, derived from snapshot queries at scrape time. The
//! endpoint doubles as a watchdog: every scrape re-arms the rental
//! boundary worker.

use super::{ApiResult, AppState};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use serde_json::Value;

fn basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

pub async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    if let Some(secret) = &state.config.http.metrics_secret {
        let authorized = matches!(
            basic_auth(&headers),
            Some((username, password)) if !username.is_empty() && password == *secret
        );
        if !authorized {
            return Ok(StatusCode::FORBIDDEN.into_response());
        }
    }

    let mut content: Vec<String> = Vec::new();

    for vehicle in state.vehicles.list()? {
        content.push(format!(
            "vehicle{{id=\"{}\", vehicle_id=\"{}\", mobile_enabled=\"{}\"}} 1",
            vehicle.remote_id,
            vehicle.vehicle_id,
            i32::from(vehicle.mobile_enabled == Some(true)),
        ));

        let Some(latest) = state.snapshots.latest(vehicle.id)? else {
            continue;
        };

        content.push(format!(
            "vehicle_updated_at{{vehicle=\"{}\"}} {}",
            vehicle.vehicle_id,
            latest.captured_at.timestamp()
        ));
        let offline = latest.data.get("state").and_then(Value::as_str) != Some("online");
        content.push(format!(
            "vehicle_offline{{vehicle=\"{}\"}} {}",
            vehicle.vehicle_id,
            i32::from(offline)
        ));

        if let Some(online) = state.snapshots.latest_online(vehicle.id)? {
            content.push(format!(
                "vehicle_last_online_at{{vehicle=\"{}\"}} {}",
                vehicle.vehicle_id,
                online.captured_at.timestamp()
            ));
        }

        // Locked-since needs both sides: while the newest evidence says
        // locked, the value keeps advancing with the scrape time.
        let locked = state.snapshots.latest_locked(vehicle.id, true)?;
        let unlocked = state.snapshots.latest_locked(vehicle.id, false)?;
        if let (Some(locked), Some(unlocked)) = (locked, unlocked) {
            let since = if unlocked.captured_at > locked.captured_at {
                locked.captured_at
            } else {
                Utc::now()
            };
            content.push(format!(
                "vehicle_locked{{vehicle=\"{}\"}} {}",
                vehicle.vehicle_id,
                since.timestamp()
            ));
        }
    }

    for credential in state.credentials.list()? {
        content.push(format!(
            "token_expires_at{{id=\"{}\"}} {}",
            credential.email,
            credential.token_expires_at.timestamp()
        ));
    }

    state.scheduler.ensure_running();
    if let Some(initialized_at) = state.scheduler.initialized_at() {
        content.push(format!(
            "background_task_initialized_at {}",
            initialized_at.timestamp()
        ));
    }

    content.push(String::new());
    Ok((
        [(header::CONTENT_TYPE, "text/plain")],
        content.join("\n"),
    )
        .into_response())
}
