//! REST API routes.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::{drones, missions, request_id, ws};
use crate::state::AppState;

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    let mission_routes = Router::new()
        .route(
            "/v1/missions",
            post(missions::create_mission).get(missions::list_missions),
        )
        .route("/v1/missions/:id", get(missions::get_mission))
        .route("/v1/missions/:id/stream", get(ws::mission_stream))
        .route("/v1/missions/:id/:command", post(missions::control_mission));

    let drone_routes = Router::new()
        .route("/v1/drones", get(drones::list_drones))
        .route("/v1/drones/available", get(drones::available_drones))
        .route("/v1/drones/register", post(drones::register_drone))
        .route("/v1/drones/assign/:mission_id", post(drones::assign_drone));

    mission_routes
        .merge(drone_routes)
        .layer(middleware::from_fn(request_id::ensure_request_id))
}
