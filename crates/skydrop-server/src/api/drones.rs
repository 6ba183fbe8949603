//! Fleet inventory endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use skydrop_core::{Coordinate, Drone, DroneCapabilities, DroneStatus};

use crate::fleet::FleetError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterDroneRequest {
    pub drone_id: String,
    #[serde(default)]
    pub status: DroneStatus,
    #[serde(default = "full_battery")]
    pub battery_percent: f64,
    pub location: Coordinate,
    pub capabilities: DroneCapabilities,
}

fn full_battery() -> f64 {
    100.0
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignRequest {
    #[serde(default)]
    pub payload_kg: f64,
}

#[derive(Debug, Serialize)]
pub struct AssignResponse {
    pub mission_id: String,
    pub drone: Drone,
}

/// GET /v1/drones
pub async fn list_drones(State(state): State<Arc<AppState>>) -> Json<Vec<Drone>> {
    Json(state.fleet.list())
}

/// Idle drones with enough charge for a mission.
/// GET /v1/drones/available
pub async fn available_drones(State(state): State<Arc<AppState>>) -> Json<Vec<Drone>> {
    Json(state.fleet.available())
}

/// POST /v1/drones/register
pub async fn register_drone(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterDroneRequest>,
) -> Result<(StatusCode, Json<Drone>), (StatusCode, Json<Value>)> {
    let drone_id = req.drone_id.trim().to_string();
    if drone_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "drone_id is required" })),
        ));
    }
    if !req.location.is_valid() || !(0.0..=100.0).contains(&req.battery_percent) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Invalid drone record",
                "hint": "location must be a valid coordinate and battery_percent within 0-100"
            })),
        ));
    }

    let drone = Drone {
        drone_id,
        status: req.status,
        battery_percent: req.battery_percent,
        location: req.location,
        capabilities: req.capabilities,
    };
    match state.fleet.register(drone) {
        Ok(drone) => Ok((StatusCode::CREATED, Json(drone))),
        Err(err @ FleetError::AlreadyRegistered(_)) => Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": err.to_string() })),
        )),
        Err(err) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        )),
    }
}

/// Reserve a drone able to carry the mission's payload.
/// POST /v1/drones/assign/:mission_id
pub async fn assign_drone(
    State(state): State<Arc<AppState>>,
    Path(mission_id): Path<String>,
    body: Option<Json<AssignRequest>>,
) -> Result<Json<AssignResponse>, (StatusCode, Json<Value>)> {
    let Json(req) = body.unwrap_or_default();
    match state.fleet.assign(req.payload_kg) {
        Some(drone) => {
            tracing::info!("Assigned drone {} to mission {}", drone.drone_id, mission_id);
            Ok(Json(AssignResponse { mission_id, drone }))
        }
        None => Err((
            StatusCode::CONFLICT,
            Json(json!({
                "error": "No drone available",
                "mission_id": mission_id,
                "payload_kg": req.payload_kg
            })),
        )),
    }
}
