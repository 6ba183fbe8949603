//! Mutable state of one mission, owned by its runner.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{
    ControlState, Coordinate, MissionPhase, MissionRecord, MissionStatus, Route,
};

/// Everything the simulation tracks for a single flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionState {
    pub id: String,
    pub drone_id: String,
    pub name: Option<String>,
    /// Outbound route as submitted.
    pub route: Route,
    /// Path flown home, set when the drone turns back.
    pub return_route: Option<Route>,
    /// Index of the leg (or waypoint) currently being flown on the active route.
    pub current_step: usize,
    /// Fraction of the current leg covered, in [0, 1].
    pub leg_progress: f64,
    pub phase: MissionPhase,
    pub status: MissionStatus,
    pub control: ControlState,
    pub position: Coordinate,
    pub altitude_m: f64,
    pub battery_percent: f64,
    pub heading_deg: f64,
    pub ground_speed_mps: f64,
    pub payload_aboard: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MissionState {
    /// A drone on the ground at the route origin, ready to take off.
    pub fn new(
        id: impl Into<String>,
        drone_id: impl Into<String>,
        route: Route,
        started_at: DateTime<Utc>,
    ) -> Self {
        let position = route.first();
        Self {
            id: id.into(),
            drone_id: drone_id.into(),
            name: None,
            route,
            return_route: None,
            current_step: 0,
            leg_progress: 0.0,
            phase: MissionPhase::Takeoff,
            status: MissionStatus::TakingOff,
            control: ControlState::Running,
            position,
            altitude_m: 0.0,
            battery_percent: 100.0,
            heading_deg: 0.0,
            ground_speed_mps: 0.0,
            payload_aboard: true,
            started_at,
            completed_at: None,
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Route the current step indexes into: the return path once turned back.
    pub fn active_route(&self) -> &Route {
        match (&self.return_route, self.phase) {
            (Some(home), MissionPhase::Returning | MissionPhase::Landing) => home,
            _ => &self.route,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Stop in place. No further phase progression happens after this.
    pub fn abort(&mut self, now: DateTime<Utc>) {
        self.status = MissionStatus::Aborted;
        self.control = ControlState::AbortRequested;
        self.completed_at = Some(now);
    }

    /// Mark an irrecoverable error.
    pub fn fail(&mut self, now: DateTime<Utc>) {
        self.status = MissionStatus::Failed;
        self.completed_at = Some(now);
    }

    /// Full persisted form of this state.
    pub fn to_record(&self, eta_s: f64) -> MissionRecord {
        MissionRecord {
            id: self.id.clone(),
            drone_id: Some(self.drone_id.clone()),
            name: self.name.clone(),
            route: self.route.points().to_vec(),
            current_step: self.current_step,
            status: self.status,
            phase: Some(self.phase),
            battery_percent: self.battery_percent,
            altitude_m: self.altitude_m,
            position: Some(self.position),
            eta_s: eta_s.round(),
            started_at: Some(self.started_at),
            completed_at: self.completed_at,
        }
    }
}
