//! Remaining distance and time-to-completion estimates.

use crate::mission::MissionState;
use crate::models::{MissionPhase, Route};
use crate::profile::FlightProfile;

/// Distance and time left for a mission.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Estimate {
    pub distance_remaining_m: f64,
    pub eta_s: f64,
}

/// Horizontal distance still to fly, summed over whole legs from `step`.
///
/// `route` is the route the step indexes into (outbound, or the return path).
pub fn remaining_distance_m(phase: MissionPhase, route: &Route, step: usize) -> f64 {
    match phase {
        MissionPhase::Takeoff => route.total_distance_m(),
        MissionPhase::Cruise | MissionPhase::Returning => route.distance_from_m(step),
        MissionPhase::Delivery | MissionPhase::Landing => 0.0,
    }
}

/// Seconds until the mission ends, including fixed takeoff/landing overheads.
///
/// Ground speed is floored at the profile minimum so a stalled drone still
/// gets a finite estimate.
pub fn eta_seconds(
    phase: MissionPhase,
    remaining_m: f64,
    ground_speed_mps: f64,
    profile: &FlightProfile,
) -> f64 {
    let speed = ground_speed_mps.max(profile.min_ground_speed_mps);
    let flight_s = remaining_m / speed;

    match phase {
        MissionPhase::Takeoff => flight_s + profile.takeoff_duration_s + profile.landing_duration_s,
        MissionPhase::Cruise | MissionPhase::Returning => flight_s + profile.landing_duration_s,
        MissionPhase::Delivery => profile.landing_duration_s,
        MissionPhase::Landing => 0.0,
    }
}

/// Estimate for a mission's current phase, step and ground speed.
pub fn estimate(state: &MissionState, profile: &FlightProfile) -> Estimate {
    if state.is_terminal() {
        return Estimate::default();
    }
    let distance_remaining_m =
        remaining_distance_m(state.phase, state.active_route(), state.current_step);
    Estimate {
        distance_remaining_m,
        eta_s: eta_seconds(state.phase, distance_remaining_m, state.ground_speed_mps, profile),
    }
}
