//! Errors returned to callers of the mission coordinator.

use thiserror::Error;

use skydrop_core::{MissionStatus, RouteError};

/// Why a mission could not be started. No runner exists after any of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StartError {
    #[error("invalid route: {0}")]
    Validation(#[from] RouteError),
    #[error("no drone assigned to the mission")]
    MissingDrone,
    #[error("weather unsafe for flight: {reason}")]
    UnsafeWeather { reason: String },
    #[error("weather check failed: {0}")]
    WeatherUnavailable(String),
    #[error("mission {0} is already active")]
    AlreadyActive(String),
}

/// Why a control command was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("mission {0} not found")]
    NotFound(String),
    #[error("mission is no longer active (status {status})")]
    NotActive { status: MissionStatus },
    #[error("command not accepted: {reason}")]
    InvalidState { reason: String },
}
