use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use ensto_common::{
    session::VacationRequest,
    types::{EnergyPrice, FloorSensorType},
    CalendarProgram, DeviceSession, EnstoError, ExternalControl, FloorLimits, HeatingMode,
    Offset,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::host::{AppState, SharedSession};
use crate::simulator::SimulatedThermostat;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct BoostUpdate {
    enabled: bool,
    #[serde(rename = "durationMinutes")]
    duration_minutes: u16,
    #[serde(default)]
    offset: Offset,
}

#[derive(Debug, Deserialize)]
struct VacationUpdate {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(default)]
    offset: Offset,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/devices", get(handle_list_devices))
        .route("/api/devices/{address}", get(handle_get_device))
        .route("/api/devices/{address}/refresh", post(handle_refresh))
        .route("/api/devices/{address}/name", post(handle_set_name))
        .route("/api/devices/{address}/time", post(handle_set_time))
        .route("/api/devices/{address}/clock", get(handle_get_clock))
        .route(
            "/api/devices/{address}/calendar/{day}",
            get(handle_get_calendar_day).put(handle_put_calendar_day),
        )
        .route("/api/devices/{address}/calendar-mode", post(handle_set_calendar_mode))
        .route("/api/devices/{address}/boost", post(handle_set_boost))
        .route("/api/devices/{address}/vacation", post(handle_set_vacation))
        .route("/api/devices/{address}/heating-mode", post(handle_set_heating_mode))
        .route("/api/devices/{address}/calibration", post(handle_set_calibration))
        .route("/api/devices/{address}/floor-limits", post(handle_set_floor_limits))
        .route("/api/devices/{address}/floor-sensor", post(handle_set_floor_sensor))
        .route("/api/devices/{address}/heating-power", post(handle_set_heating_power))
        .route("/api/devices/{address}/floor-area", post(handle_set_floor_area))
        .route("/api/devices/{address}/daylight-saving", post(handle_set_daylight_saving))
        .route("/api/devices/{address}/adaptive-control", post(handle_set_adaptive_control))
        .route("/api/devices/{address}/external-control", post(handle_set_external_control))
        .route("/api/devices/{address}/energy-unit", post(handle_set_energy_unit))
        .route("/api/devices/{address}/power-history", get(handle_get_power_history))
        .route("/api/devices/{address}/monitoring", get(handle_get_monitoring))
        .with_state(state)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn status_for(err: &EnstoError) -> StatusCode {
    match err {
        EnstoError::Range { .. } | EnstoError::Validation { .. } => StatusCode::BAD_REQUEST,
        EnstoError::MalformedPayload { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EnstoError::UnsupportedCapability { .. } => StatusCode::CONFLICT,
        EnstoError::TransportTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        EnstoError::Transport { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn device_error(err: &EnstoError) -> Response {
    error_response(status_for(err), &err.to_string())
}

fn find_session(state: &AppState, address: &str) -> Option<SharedSession> {
    state.devices.get(&address.to_ascii_uppercase()).cloned()
}

fn unknown_device(address: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, &format!("Unknown device {address}"))
}

/// Snapshot after a successful update, the mapped error otherwise.
fn updated(session: &DeviceSession<SimulatedThermostat>, result: ensto_common::Result<()>) -> Response {
    match result {
        Ok(()) => Json(session.snapshot(Utc::now())).into_response(),
        Err(err) => device_error(&err),
    }
}

fn parse_enum<T: DeserializeOwned>(value: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_ascii_uppercase())).ok()
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

async fn handle_list_devices(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    let mut snapshots = Vec::with_capacity(state.devices.len());
    for session in state.devices.values() {
        snapshots.push(session.lock().await.snapshot(now));
    }
    Json(snapshots)
}

async fn handle_get_device(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let snapshot = session.lock().await.snapshot(Utc::now());
    Json(snapshot).into_response()
}

async fn handle_refresh(State(state): State<AppState>, Path(address): Path<String>) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let mut device = session.lock().await;
    let result = device.refresh(Utc::now()).await;
    updated(&device, result)
}

async fn handle_set_name(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let Some(name) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };

    let mut device = session.lock().await;
    let result = device.set_device_name(name).await;
    updated(&device, result)
}

async fn handle_set_time(State(state): State<AppState>, Path(address): Path<String>) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let mut device = session.lock().await;
    let result = device.set_device_time(Utc::now()).await;
    updated(&device, result)
}

async fn handle_get_clock(State(state): State<AppState>, Path(address): Path<String>) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let mut device = session.lock().await;
    match device.read_clock_status(Utc::now()).await {
        Ok(status) => Json(status).into_response(),
        Err(err) => device_error(&err),
    }
}

async fn handle_get_calendar_day(
    State(state): State<AppState>,
    Path((address, day)): Path<(String, u8)>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let mut device = session.lock().await;
    match device.get_calendar_day(day).await {
        Ok(calendar) => Json(calendar).into_response(),
        Err(err) => device_error(&err),
    }
}

async fn handle_put_calendar_day(
    State(state): State<AppState>,
    Path((address, day)): Path<(String, u8)>,
    Json(programs): Json<Vec<CalendarProgram>>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let mut device = session.lock().await;
    if let Err(err) = device.set_calendar_day(day, &programs).await {
        return device_error(&err);
    }
    match device.get_calendar_day(day).await {
        Ok(calendar) => Json(calendar).into_response(),
        Err(err) => device_error(&err),
    }
}

async fn handle_set_calendar_mode(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(enabled) = parse_switch(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid switch value. Use 'on' or 'off'");
    };

    let mut device = session.lock().await;
    let result = device.set_calendar_mode(enabled).await;
    updated(&device, result)
}

async fn handle_set_boost(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(update): Json<BoostUpdate>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let mut device = session.lock().await;
    let result = device
        .set_boost(update.enabled, update.duration_minutes, update.offset, Utc::now())
        .await;
    updated(&device, result)
}

async fn handle_set_vacation(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(update): Json<VacationUpdate>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let request = VacationRequest {
        start: update.start,
        end: update.end,
        offset: update.offset,
        enabled: update.enabled,
    };
    let mut device = session.lock().await;
    let result = device.set_vacation(request).await;
    updated(&device, result)
}

async fn handle_set_heating_mode(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(mode) = parse_enum::<HeatingMode>(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid mode. Use FLOOR, ROOM, COMBINATION, POWER or FORCE_CONTROL",
        );
    };

    let mut device = session.lock().await;
    let result = device.set_heating_mode(mode).await;
    updated(&device, result)
}

async fn handle_set_calibration(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(calibration) = value.parse::<f32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid calibration value (-5.0-5.0)");
    };

    let mut device = session.lock().await;
    let result = device.set_room_calibration(calibration).await;
    updated(&device, result)
}

async fn handle_set_floor_limits(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(limits): Json<FloorLimits>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let mut device = session.lock().await;
    let result = device.set_floor_limits(limits).await;
    updated(&device, result)
}

async fn handle_set_floor_sensor(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(sensor_type) = parse_enum::<FloorSensorType>(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid floor sensor type");
    };

    let mut device = session.lock().await;
    let result = device.set_floor_sensor(sensor_type).await;
    updated(&device, result)
}

async fn handle_set_heating_power(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(watts) = value.parse::<u16>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid heating power (0-9999 W)");
    };

    let mut device = session.lock().await;
    let result = device.set_heating_power(watts).await;
    updated(&device, result)
}

async fn handle_set_floor_area(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(area) = value.parse::<u16>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid floor area");
    };

    let mut device = session.lock().await;
    let result = device.set_floor_area(area).await;
    updated(&device, result)
}

async fn handle_set_daylight_saving(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(enabled) = parse_switch(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid switch value. Use 'on' or 'off'");
    };

    let mut device = session.lock().await;
    let result = device.set_daylight_saving(enabled, Utc::now()).await;
    updated(&device, result)
}

async fn handle_set_adaptive_control(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(enabled) = parse_switch(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid switch value. Use 'on' or 'off'");
    };

    let mut device = session.lock().await;
    let result = device.set_adaptive_control(enabled).await;
    updated(&device, result)
}

async fn handle_set_external_control(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(control): Json<ExternalControl>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let mut device = session.lock().await;
    let result = device.set_external_control(control).await;
    updated(&device, result)
}

async fn handle_set_energy_unit(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(price): Json<EnergyPrice>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let mut device = session.lock().await;
    let result = device.set_energy_unit(price).await;
    updated(&device, result)
}

async fn handle_get_power_history(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let mut device = session.lock().await;
    match device.read_power_history().await {
        Ok(history) => Json(history).into_response(),
        Err(err) => device_error(&err),
    }
}

async fn handle_get_monitoring(State(state): State<AppState>, Path(address): Path<String>) -> Response {
    let Some(session) = find_session(&state, &address) else {
        return unknown_device(&address);
    };
    let mut device = session.lock().await;
    match device.read_monitoring_data().await {
        Ok(data) => Json(data).into_response(),
        Err(err) => device_error(&err),
    }
}
