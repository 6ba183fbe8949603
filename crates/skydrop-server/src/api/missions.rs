//! Mission lifecycle endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use skydrop_core::{Coordinate, MissionRecord, MissionStatus, TelemetrySnapshot};

use crate::coordinator::StartMission;
use crate::error::{ControlError, StartError};
use crate::runner::ControlCommand;
use crate::state::AppState;

type ApiError = (StatusCode, Json<Value>);

/// Request to create and launch a mission.
#[derive(Debug, Deserialize)]
pub struct CreateMissionRequest {
    pub mission_id: Option<String>,
    /// Assigned from the fleet when omitted
    pub drone_id: Option<String>,
    pub route: Vec<Coordinate>,
    pub name: Option<String>,
    /// Payload weight used for fleet assignment
    #[serde(default)]
    pub payload_kg: f64,
}

#[derive(Debug, Serialize)]
pub struct CreateMissionResponse {
    pub mission_id: String,
    pub drone_id: String,
}

#[derive(Debug, Serialize)]
pub struct MissionDetail {
    #[serde(flatten)]
    pub record: MissionRecord,
    pub active: bool,
    pub telemetry: Option<TelemetrySnapshot>,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub mission_id: String,
    pub command: ControlCommand,
    pub status: MissionStatus,
}

/// Create a mission and start its runner.
/// POST /v1/missions
pub async fn create_mission(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMissionRequest>,
) -> Result<(StatusCode, Json<CreateMissionResponse>), ApiError> {
    let (drone_id, reserved) = match req.drone_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => (id, false),
        None => {
            // Route errors take precedence over an empty fleet.
            if let Err(err) = skydrop_core::Route::new(req.route.clone()) {
                return Err(start_error(StartError::from(err)));
            }
            let drone = state.fleet.assign(req.payload_kg).ok_or_else(|| {
                (
                    StatusCode::CONFLICT,
                    Json(json!({
                        "error": "No drone available",
                        "hint": "Register a drone or pass drone_id explicitly",
                        "payload_kg": req.payload_kg
                    })),
                )
            })?;
            (drone.drone_id, true)
        }
    };

    let request = StartMission {
        mission_id: req.mission_id,
        drone_id: drone_id.clone(),
        route: req.route,
        name: req.name,
    };
    match state.coordinator.start(request).await {
        Ok(mission_id) => Ok((
            StatusCode::CREATED,
            Json(CreateMissionResponse {
                mission_id,
                drone_id,
            }),
        )),
        Err(err) => {
            if reserved {
                if let Err(release_err) = state.fleet.release(&drone_id) {
                    tracing::warn!("Failed to release drone {}: {}", drone_id, release_err);
                }
            }
            Err(start_error(err))
        }
    }
}

/// GET /v1/missions
pub async fn list_missions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MissionRecord>>, ApiError> {
    state
        .coordinator
        .list()
        .await
        .map(Json)
        .map_err(store_error)
}

/// Stored record plus the live snapshot while the mission is running.
/// GET /v1/missions/:id
pub async fn get_mission(
    State(state): State<Arc<AppState>>,
    Path(mission_id): Path<String>,
) -> Result<Json<MissionDetail>, ApiError> {
    let record = state
        .coordinator
        .get(&mission_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found(&mission_id))?;
    Ok(Json(MissionDetail {
        active: state.coordinator.is_active(&mission_id),
        telemetry: state.coordinator.latest_snapshot(&mission_id),
        record,
    }))
}

/// POST /v1/missions/:id/:command
pub async fn control_mission(
    State(state): State<Arc<AppState>>,
    Path((mission_id, command)): Path<(String, String)>,
) -> Result<Json<ControlResponse>, ApiError> {
    let command = ControlCommand::parse(&command).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("Unknown command '{}'", command),
                "hint": "Use pause, resume, abort or cancel"
            })),
        )
    })?;

    match state.coordinator.control(&mission_id, command).await {
        Ok(status) => Ok(Json(ControlResponse {
            mission_id,
            command,
            status,
        })),
        Err(err) => Err(control_error(&mission_id, err)),
    }
}

fn start_error(err: StartError) -> ApiError {
    let status = match &err {
        StartError::Validation(_) | StartError::MissingDrone => StatusCode::BAD_REQUEST,
        StartError::AlreadyActive(_) => StatusCode::CONFLICT,
        StartError::UnsafeWeather { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        StartError::WeatherUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

fn control_error(mission_id: &str, err: ControlError) -> ApiError {
    match err {
        ControlError::NotFound(_) => not_found(mission_id),
        ControlError::NotActive { status } => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": err.to_string(),
                "mission_id": mission_id,
                "status": status
            })),
        ),
        ControlError::InvalidState { .. } => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": err.to_string(),
                "mission_id": mission_id
            })),
        ),
    }
}

fn not_found(mission_id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Mission not found",
            "mission_id": mission_id
        })),
    )
}

fn store_error(err: anyhow::Error) -> ApiError {
    tracing::error!("Mission store error: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Mission store unavailable" })),
    )
}
