//! Core data models for delivery missions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RouteError;
use crate::geo;

/// A point on the (spherical) earth in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
    /// Optional altitude hint supplied with the route (meters).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon, alt: None }
    }

    /// True if both components are finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat.abs() <= 90.0
            && self.lon.abs() <= 180.0
    }
}

/// Ordered waypoints of a mission. Always holds at least two points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coordinate>", into = "Vec<Coordinate>")]
pub struct Route(Vec<Coordinate>);

impl Route {
    /// Minimum number of waypoints a route may have.
    pub const MIN_POINTS: usize = 2;

    /// Validate and wrap a list of waypoints.
    pub fn new(points: Vec<Coordinate>) -> Result<Self, RouteError> {
        if points.len() < Self::MIN_POINTS {
            return Err(RouteError::TooShort { len: points.len() });
        }
        if let Some(index) = points.iter().position(|p| !p.is_valid()) {
            let point = points[index];
            return Err(RouteError::InvalidCoordinate {
                index,
                lat: point.lat,
                lon: point.lon,
            });
        }
        Ok(Self(points))
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the final waypoint.
    pub fn last_index(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    pub fn first(&self) -> Coordinate {
        self.0[0]
    }

    pub fn last(&self) -> Coordinate {
        self.0[self.last_index()]
    }

    pub fn get(&self, index: usize) -> Option<Coordinate> {
        self.0.get(index).copied()
    }

    /// Endpoints of the leg starting at `index`.
    pub fn leg(&self, index: usize) -> Option<(Coordinate, Coordinate)> {
        Some((self.get(index)?, self.get(index + 1)?))
    }

    /// Great-circle length of the leg starting at `index` (0 if out of range).
    pub fn leg_distance_m(&self, index: usize) -> f64 {
        self.leg(index)
            .map(|(a, b)| geo::distance_meters(&a, &b))
            .unwrap_or(0.0)
    }

    /// Sum of leg lengths from waypoint `from` to the end of the route.
    pub fn distance_from_m(&self, from: usize) -> f64 {
        (from..self.last_index()).map(|i| self.leg_distance_m(i)).sum()
    }

    pub fn total_distance_m(&self) -> f64 {
        self.distance_from_m(0)
    }

    /// The same waypoints traversed from the last one back to the first.
    pub fn reversed(&self) -> Self {
        let mut points = self.0.clone();
        points.reverse();
        Self(points)
    }

    /// Path from `position` back to the origin through the waypoints up to and
    /// including `passed` (most recently passed first).
    pub fn homeward_from(&self, position: Coordinate, passed: usize) -> Self {
        let passed = passed.min(self.last_index());
        let mut points = Vec::with_capacity(passed + 2);
        points.push(position);
        points.extend(self.0[..=passed].iter().rev().copied());
        Self(points)
    }
}

impl TryFrom<Vec<Coordinate>> for Route {
    type Error = RouteError;

    fn try_from(points: Vec<Coordinate>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<Route> for Vec<Coordinate> {
    fn from(route: Route) -> Self {
        route.0
    }
}

/// Stage of the flight profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionPhase {
    #[default]
    Takeoff,
    Cruise,
    Delivery,
    Returning,
    Landing,
}

impl MissionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionPhase::Takeoff => "takeoff",
            MissionPhase::Cruise => "cruise",
            MissionPhase::Delivery => "delivery",
            MissionPhase::Returning => "returning",
            MissionPhase::Landing => "landing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "takeoff" => Some(Self::Takeoff),
            "cruise" => Some(Self::Cruise),
            "delivery" => Some(Self::Delivery),
            "returning" => Some(Self::Returning),
            "landing" => Some(Self::Landing),
            _ => None,
        }
    }
}

impl fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a mission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    /// Created but not yet launched
    #[default]
    Idle,
    /// Climbing to cruise altitude
    TakingOff,
    /// Flying the route
    InProgress,
    /// Ticking suspended by operator
    Paused,
    /// Turned back by operator, still flying home
    Cancelled,
    /// Landed back at the origin
    Completed,
    /// Irrecoverable simulation error
    Failed,
    /// Stopped in place by operator
    Aborted,
}

impl MissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MissionStatus::Completed | MissionStatus::Failed | MissionStatus::Aborted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Idle => "idle",
            MissionStatus::TakingOff => "taking_off",
            MissionStatus::InProgress => "in_progress",
            MissionStatus::Paused => "paused",
            MissionStatus::Cancelled => "cancelled",
            MissionStatus::Completed => "completed",
            MissionStatus::Failed => "failed",
            MissionStatus::Aborted => "aborted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "taking_off" => Some(Self::TakingOff),
            "in_progress" => Some(Self::InProgress),
            "paused" => Some(Self::Paused),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator control flag carried by a running mission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    #[default]
    Running,
    Paused,
    AbortRequested,
    CancelRequested,
}

/// Wind and visibility at a location, as reported by a weather provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub wind_speed_mps: f64,
    /// Direction the wind blows toward, degrees clockwise from true north.
    pub wind_direction_deg: f64,
    pub visibility_m: f64,
    pub is_safe: bool,
    #[serde(default)]
    pub reason: String,
}

impl WeatherReport {
    /// No wind, unlimited visibility. Used when no report is available.
    pub fn calm() -> Self {
        Self {
            wind_speed_mps: 0.0,
            wind_direction_deg: 0.0,
            visibility_m: 10_000.0,
            is_safe: true,
            reason: String::new(),
        }
    }
}

/// Ground characteristics near a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainSample {
    pub elevation_m: f64,
    #[serde(default)]
    pub slope_deg: f64,
    #[serde(default)]
    pub surface_type: String,
    #[serde(default)]
    pub wind_exposure: String,
    #[serde(default = "default_air_density")]
    pub air_density: f64,
}

fn default_air_density() -> f64 {
    1.225
}

/// Immutable view of a mission published to subscribers once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub mission_id: String,
    pub drone_id: String,
    pub position: Coordinate,
    pub altitude_m: f64,
    pub phase: MissionPhase,
    pub status: MissionStatus,
    pub control: ControlState,
    pub current_step: usize,
    pub battery_percent: f64,
    pub eta_s: f64,
    pub distance_remaining_m: f64,
    pub heading_deg: f64,
    pub ground_speed_mps: f64,
    pub wind_speed_mps: f64,
    pub wind_direction_deg: f64,
    /// Weather came from a fallback rather than a fresh report.
    #[serde(default)]
    pub weather_stale: bool,
    /// Terrain data existed beneath the drone.
    #[serde(default)]
    pub terrain_available: bool,
    pub timestamp: DateTime<Utc>,
}

/// Persisted copy of a mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionRecord {
    pub id: String,
    pub drone_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub route: Vec<Coordinate>,
    pub current_step: usize,
    pub status: MissionStatus,
    pub phase: Option<MissionPhase>,
    pub battery_percent: f64,
    pub altitude_m: f64,
    pub position: Option<Coordinate>,
    pub eta_s: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MissionRecord {
    /// Empty record for `id`, used when an update arrives before a create.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            drone_id: None,
            name: None,
            route: Vec::new(),
            current_step: 0,
            status: MissionStatus::Idle,
            phase: None,
            battery_percent: 100.0,
            altitude_m: 0.0,
            position: None,
            eta_s: 0.0,
            started_at: None,
            completed_at: None,
        }
    }

    /// Merge the fields present in `patch`, leaving the rest untouched.
    pub fn apply(&mut self, patch: &MissionPatch) {
        if let Some(step) = patch.current_step {
            self.current_step = step;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(phase) = patch.phase {
            self.phase = Some(phase);
        }
        if let Some(battery) = patch.battery_percent {
            self.battery_percent = battery;
        }
        if let Some(altitude) = patch.altitude_m {
            self.altitude_m = altitude;
        }
        if let Some(position) = patch.position {
            self.position = Some(position);
        }
        if let Some(eta) = patch.eta_s {
            self.eta_s = eta;
        }
        if let Some(started_at) = patch.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
    }
}

/// Partial update of a [`MissionRecord`]. `None` fields are left as stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionPatch {
    pub current_step: Option<usize>,
    pub status: Option<MissionStatus>,
    pub phase: Option<MissionPhase>,
    pub battery_percent: Option<f64>,
    pub altitude_m: Option<f64>,
    pub position: Option<Coordinate>,
    pub eta_s: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MissionPatch {
    pub fn status(status: MissionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Checkpoint of everything a telemetry snapshot carries.
    pub fn from_snapshot(snapshot: &TelemetrySnapshot) -> Self {
        Self {
            current_step: Some(snapshot.current_step),
            status: Some(snapshot.status),
            phase: Some(snapshot.phase),
            battery_percent: Some(snapshot.battery_percent),
            altitude_m: Some(snapshot.altitude_m),
            position: Some(snapshot.position),
            eta_s: Some(snapshot.eta_s.round()),
            started_at: None,
            completed_at: None,
        }
    }
}

// ========== FLEET ==========

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneStatus {
    #[default]
    Idle,
    InMission,
    Charging,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneCapabilities {
    pub payload_kg: f64,
    pub range_km: f64,
}

/// A drone known to the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    pub drone_id: String,
    #[serde(default)]
    pub status: DroneStatus,
    pub battery_percent: f64,
    pub location: Coordinate,
    pub capabilities: DroneCapabilities,
}

/// What happened to a drone during a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DroneEventKind {
    /// Mission launched with this drone
    Dispatched,
    /// Position/battery update while flying
    Progress,
    /// Mission reached a terminal status; the drone is free again
    Released,
}

/// One-way notification from a running mission to the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneEvent {
    pub drone_id: String,
    pub mission_id: String,
    pub kind: DroneEventKind,
    pub location: Coordinate,
    pub battery_percent: f64,
    pub timestamp: DateTime<Utc>,
}
