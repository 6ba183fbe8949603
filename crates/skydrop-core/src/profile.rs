//! Flight profile constants for the delivery simulation.

use serde::{Deserialize, Serialize};

/// Tunable parameters of a delivery flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightProfile {
    /// Commanded airspeed in meters per second
    pub cruise_speed_mps: f64,
    /// Clearance kept above terrain while cruising and returning
    pub min_altitude_m: f64,
    /// Clearance above terrain at the drop point
    pub delivery_clearance_m: f64,
    /// Altitude gained per tick during takeoff
    pub climb_m_per_tick: f64,
    /// Altitude lost per tick while descending for the drop
    pub delivery_descent_m_per_tick: f64,
    /// Altitude lost per tick while landing
    pub landing_descent_m_per_tick: f64,
    /// Fixed time budget for takeoff in ETA estimates (seconds)
    pub takeoff_duration_s: f64,
    /// Fixed time budget for landing in ETA estimates (seconds)
    pub landing_duration_s: f64,
    /// Battery percent consumed per tick
    pub battery_drain_per_tick: f64,
    /// Drain multiplier while the payload is aboard (1.0 = no payload effect)
    pub payload_drain_factor: f64,
    /// Ground speed never drops below this, so a headwind stall still progresses
    pub min_ground_speed_mps: f64,
}

impl Default for FlightProfile {
    fn default() -> Self {
        Self {
            cruise_speed_mps: 50.0,
            min_altitude_m: 50.0,
            delivery_clearance_m: 2.0,
            climb_m_per_tick: 20.0,
            delivery_descent_m_per_tick: 40.0,
            landing_descent_m_per_tick: 20.0,
            takeoff_duration_s: 10.0,
            landing_duration_s: 10.0,
            battery_drain_per_tick: 0.1,
            payload_drain_factor: 1.0,
            min_ground_speed_mps: 0.5,
        }
    }
}

impl FlightProfile {
    /// Returns list of problems with this profile (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let positive = [
            ("cruise_speed_mps", self.cruise_speed_mps),
            ("climb_m_per_tick", self.climb_m_per_tick),
            ("delivery_descent_m_per_tick", self.delivery_descent_m_per_tick),
            ("landing_descent_m_per_tick", self.landing_descent_m_per_tick),
            ("min_ground_speed_mps", self.min_ground_speed_mps),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                errors.push(format!("{name} must be positive, got {value}"));
            }
        }

        let non_negative = [
            ("min_altitude_m", self.min_altitude_m),
            ("delivery_clearance_m", self.delivery_clearance_m),
            ("takeoff_duration_s", self.takeoff_duration_s),
            ("landing_duration_s", self.landing_duration_s),
            ("battery_drain_per_tick", self.battery_drain_per_tick),
            ("payload_drain_factor", self.payload_drain_factor),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(format!("{name} cannot be negative, got {value}"));
            }
        }

        if self.delivery_clearance_m > self.min_altitude_m {
            errors.push(format!(
                "delivery clearance ({}) must not exceed cruise clearance ({})",
                self.delivery_clearance_m, self.min_altitude_m
            ));
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Battery consumed by one tick flown in a phase with or without payload.
    pub fn drain_for(&self, carrying_payload: bool) -> f64 {
        if carrying_payload {
            self.battery_drain_per_tick * self.payload_drain_factor
        } else {
            self.battery_drain_per_tick
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_valid() {
        assert!(FlightProfile::default().is_valid());
    }

    #[test]
    fn validate_reports_each_problem() {
        let profile = FlightProfile {
            cruise_speed_mps: 0.0,
            battery_drain_per_tick: -1.0,
            delivery_clearance_m: 80.0,
            ..FlightProfile::default()
        };
        let errors = profile.validate();
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn payload_factor_only_applies_with_payload() {
        let profile = FlightProfile {
            payload_drain_factor: 1.5,
            ..FlightProfile::default()
        };
        assert!((profile.drain_for(true) - 0.15).abs() < 1e-12);
        assert!((profile.drain_for(false) - 0.1).abs() < 1e-12);
    }
}
