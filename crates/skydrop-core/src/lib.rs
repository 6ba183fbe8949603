pub mod error;
pub mod eta;
pub mod geo;
pub mod mission;
pub mod models;
pub mod phase;
pub mod profile;

pub use error::{MissionError, RouteError};
pub use eta::{estimate, eta_seconds, remaining_distance_m, Estimate};
pub use geo::{
    bearing_degrees, distance_meters, haversine_distance, interpolate, normalize_heading,
    wind_drift, DriftOffset, WindDrift,
};
pub use mission::MissionState;
pub use models::{
    ControlState, Coordinate, Drone, DroneCapabilities, DroneEvent, DroneEventKind, DroneStatus,
    MissionPatch, MissionPhase, MissionRecord, MissionStatus, Route, TelemetrySnapshot,
    TerrainSample, WeatherReport,
};
pub use phase::{PhaseController, PhaseTransition, TickInputs, TickOutcome};
pub use profile::FlightProfile;
