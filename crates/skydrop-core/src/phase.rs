//! Phase state machine driving a mission one tick at a time.
//!
//! ```text
//! Takeoff -> Cruise -> (Cruise per leg) -> Delivery -> Returning -> (Returning per leg) -> Landing -> Completed
//! ```
//!
//! A pending cancel turns any phase except Landing into Returning on the next tick.

use chrono::{DateTime, Utc};

use crate::error::MissionError;
use crate::geo::{bearing_degrees, distance_meters, interpolate, wind_drift};
use crate::mission::MissionState;
use crate::models::{ControlState, MissionPhase, MissionStatus};
use crate::profile::FlightProfile;

/// Environment observed for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInputs {
    pub wind_speed_mps: f64,
    pub wind_direction_deg: f64,
    /// Ground elevation under the drone, `None` when no terrain data exists.
    pub terrain_elevation_m: Option<f64>,
    /// Simulated seconds covered by this tick.
    pub dt_s: f64,
    pub now: DateTime<Utc>,
}

impl TickInputs {
    /// No wind, no terrain, one second per tick.
    pub fn calm(now: DateTime<Utc>) -> Self {
        Self {
            wind_speed_mps: 0.0,
            wind_direction_deg: 0.0,
            terrain_elevation_m: None,
            dt_s: 1.0,
            now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: MissionPhase,
    pub to: MissionPhase,
}

/// What changed during a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub transition: Option<PhaseTransition>,
    /// The leg index moved forward without a phase change.
    pub step_advanced: bool,
    /// A pending cancel was consumed and the drone turned back.
    pub turned_back: bool,
    pub completed: bool,
}

/// Applies the flight profile to a mission state.
#[derive(Debug, Clone, Default)]
pub struct PhaseController {
    profile: FlightProfile,
}

impl PhaseController {
    pub fn new(profile: FlightProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &FlightProfile {
        &self.profile
    }

    /// Advance `state` by one tick.
    ///
    /// Order: consume a pending cancel, steer and move, evaluate the phase,
    /// drain the battery. Terminal states are left untouched.
    pub fn tick(
        &self,
        state: &mut MissionState,
        inputs: &TickInputs,
    ) -> Result<TickOutcome, MissionError> {
        let mut outcome = TickOutcome::default();
        if state.is_terminal() {
            return Ok(outcome);
        }

        let phase_before = state.phase;
        if state.control == ControlState::CancelRequested {
            outcome.turned_back = self.turn_back(state);
        }

        self.steer(state, inputs)?;
        self.evaluate(state, inputs, &mut outcome);

        if !outcome.completed {
            let drain = self.profile.drain_for(state.payload_aboard);
            state.battery_percent = (state.battery_percent - drain).max(0.0);
        }

        if state.phase != phase_before {
            outcome.transition = Some(PhaseTransition {
                from: phase_before,
                to: state.phase,
            });
        }
        Ok(outcome)
    }

    /// Consume a cancel request. Returns true if the drone was turned around.
    fn turn_back(&self, state: &mut MissionState) -> bool {
        state.control = ControlState::Running;
        match state.phase {
            MissionPhase::Landing => false,
            MissionPhase::Returning => {
                // already headed home; keep the current path
                state.status = MissionStatus::Cancelled;
                true
            }
            MissionPhase::Takeoff | MissionPhase::Cruise | MissionPhase::Delivery => {
                let home = state.route.homeward_from(state.position, state.current_step);
                state.return_route = Some(home);
                state.phase = MissionPhase::Returning;
                state.current_step = 0;
                state.leg_progress = 0.0;
                state.status = MissionStatus::Cancelled;
                true
            }
        }
    }

    /// Update heading and ground speed, and move along the active leg.
    fn steer(&self, state: &mut MissionState, inputs: &TickInputs) -> Result<(), MissionError> {
        let profile = &self.profile;
        match state.phase {
            MissionPhase::Cruise | MissionPhase::Returning => {
                let route = state.active_route();
                let len = route.len();
                let (start, end) = route.leg(state.current_step).ok_or(
                    MissionError::RouteExhausted {
                        step: state.current_step,
                        len,
                    },
                )?;

                let heading = bearing_degrees(&state.position, &end);
                let drift = wind_drift(
                    inputs.wind_speed_mps,
                    inputs.wind_direction_deg,
                    profile.cruise_speed_mps,
                    heading,
                );
                let ground_speed = drift.resultant_speed_mps.max(profile.min_ground_speed_mps);

                let leg_m = distance_meters(&start, &end);
                state.leg_progress = if leg_m <= f64::EPSILON {
                    1.0
                } else {
                    (state.leg_progress + ground_speed * inputs.dt_s / leg_m).min(1.0)
                };
                state.position = if state.leg_progress >= 1.0 {
                    end
                } else {
                    interpolate(&start, &end, state.leg_progress, drift.offset(inputs.dt_s))
                };
                state.heading_deg = heading;
                state.ground_speed_mps = ground_speed;
            }
            MissionPhase::Takeoff | MissionPhase::Delivery | MissionPhase::Landing => {
                // hovering; heading only matters for the ETA's ground speed
                if state.phase == MissionPhase::Takeoff {
                    if let Some((_, next)) = state.route.leg(0) {
                        state.heading_deg = bearing_degrees(&state.position, &next);
                    }
                }
                let drift = wind_drift(
                    inputs.wind_speed_mps,
                    inputs.wind_direction_deg,
                    profile.cruise_speed_mps,
                    state.heading_deg,
                );
                state.ground_speed_mps =
                    drift.resultant_speed_mps.max(profile.min_ground_speed_mps);
            }
        }
        Ok(())
    }

    /// Altitude targets and phase transitions.
    fn evaluate(&self, state: &mut MissionState, inputs: &TickInputs, outcome: &mut TickOutcome) {
        let profile = &self.profile;
        let ground = inputs.terrain_elevation_m.unwrap_or(0.0).max(0.0);

        match state.phase {
            MissionPhase::Takeoff => {
                let target = ground + profile.min_altitude_m;
                state.altitude_m += profile.climb_m_per_tick;
                if state.altitude_m >= target {
                    state.altitude_m = target;
                    state.phase = MissionPhase::Cruise;
                    state.current_step = 0;
                    state.leg_progress = 0.0;
                    if state.status == MissionStatus::TakingOff {
                        state.status = MissionStatus::InProgress;
                    }
                }
            }
            MissionPhase::Cruise => {
                state.altitude_m = ground + profile.min_altitude_m;
                if state.leg_progress >= 1.0 {
                    if state.current_step + 2 >= state.route.len() {
                        state.phase = MissionPhase::Delivery;
                    } else {
                        state.current_step += 1;
                        state.leg_progress = 0.0;
                        outcome.step_advanced = true;
                    }
                }
            }
            MissionPhase::Delivery => {
                let target = ground + profile.delivery_clearance_m;
                state.altitude_m -= profile.delivery_descent_m_per_tick;
                if state.altitude_m <= target {
                    state.altitude_m = target;
                    state.payload_aboard = false;
                    state.return_route = Some(state.route.reversed());
                    state.phase = MissionPhase::Returning;
                    state.current_step = 0;
                    state.leg_progress = 0.0;
                }
            }
            MissionPhase::Returning => {
                state.altitude_m = ground + profile.min_altitude_m;
                if state.leg_progress >= 1.0 {
                    if state.current_step + 2 >= state.active_route().len() {
                        state.phase = MissionPhase::Landing;
                    } else {
                        state.current_step += 1;
                        state.leg_progress = 0.0;
                        outcome.step_advanced = true;
                    }
                }
            }
            MissionPhase::Landing => {
                state.altitude_m -= profile.landing_descent_m_per_tick;
                if state.altitude_m <= ground {
                    state.altitude_m = ground;
                    state.status = MissionStatus::Completed;
                    state.completed_at = Some(inputs.now);
                    outcome.completed = true;
                }
            }
        }
    }
}
