//! API routes for the mission server.

pub mod drones;
pub mod missions;
pub mod request_id;
mod routes;
pub mod ws;

use axum::Router;

pub fn routes() -> Router<std::sync::Arc<crate::state::AppState>> {
    routes::create_router()
}

#[cfg(test)]
mod tests;
