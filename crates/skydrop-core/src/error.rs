//! Error types for route validation and mission simulation.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    #[error("route needs at least 2 waypoints, got {len}")]
    TooShort { len: usize },
    #[error("waypoint {index} is out of range ({lat}, {lon})")]
    InvalidCoordinate { index: usize, lat: f64, lon: f64 },
}

/// Irrecoverable simulation failure. The mission is marked failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MissionError {
    #[error("step {step} has no leg on a route of {len} waypoints")]
    RouteExhausted { step: usize, len: usize },
}
