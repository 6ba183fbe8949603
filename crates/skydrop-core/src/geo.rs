//! Great-circle navigation math and wind drift.

use crate::models::Coordinate;

/// Mean earth radius used for all spherical math.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Flat-earth scale for converting drift offsets into degrees.
pub const METERS_PER_DEGREE: f64 = 111_111.0;

/// Calculate distance between two points in meters using the haversine formula.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
///
/// # Returns
/// Distance in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Great-circle distance between two coordinates in meters.
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    haversine_distance(a.lat, a.lon, b.lat, b.lon)
}

/// Initial heading from `a` to `b` in degrees, 0 = north, clockwise, in [0, 360).
pub fn bearing_degrees(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let delta_lambda = (b.lon - a.lon).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    normalize_heading(x.atan2(y).to_degrees())
}

/// Wrap an angle in degrees into [0, 360).
pub fn normalize_heading(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Result of adding the wind vector to the drone's air vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindDrift {
    /// Speed over the ground (m/s).
    pub resultant_speed_mps: f64,
    /// Track over the ground, degrees in [0, 360).
    pub resultant_heading_deg: f64,
    /// East component of the wind (m/s).
    pub drift_x_mps: f64,
    /// North component of the wind (m/s).
    pub drift_y_mps: f64,
}

impl WindDrift {
    /// Displacement caused by the wind over `dt_s` seconds.
    pub fn offset(&self, dt_s: f64) -> DriftOffset {
        DriftOffset {
            east_m: self.drift_x_mps * dt_s,
            north_m: self.drift_y_mps * dt_s,
        }
    }
}

/// Horizontal displacement in meters (x = east, y = north).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriftOffset {
    pub east_m: f64,
    pub north_m: f64,
}

/// Compose wind and airspeed as vectors.
///
/// Directions are angles from north measured clockwise, and the wind angle is
/// where the air is going, not where it comes from. This is vector addition,
/// not flight dynamics: ground speed can differ a lot from airspeed in a crosswind.
pub fn wind_drift(
    wind_speed_mps: f64,
    wind_direction_deg: f64,
    air_speed_mps: f64,
    heading_deg: f64,
) -> WindDrift {
    let wind_rad = wind_direction_deg.to_radians();
    let heading_rad = heading_deg.to_radians();

    let wind_x = wind_speed_mps * wind_rad.sin();
    let wind_y = wind_speed_mps * wind_rad.cos();

    let air_x = air_speed_mps * heading_rad.sin();
    let air_y = air_speed_mps * heading_rad.cos();

    let ground_x = air_x + wind_x;
    let ground_y = air_y + wind_y;

    WindDrift {
        resultant_speed_mps: ground_x.hypot(ground_y),
        resultant_heading_deg: normalize_heading(ground_x.atan2(ground_y).to_degrees()),
        drift_x_mps: wind_x,
        drift_y_mps: wind_y,
    }
}

/// Convert an east/west offset in meters to degrees longitude at `ref_lat_deg`.
pub fn meters_to_lon(meters: f64, ref_lat_deg: f64) -> f64 {
    let meters_per_deg = (METERS_PER_DEGREE * ref_lat_deg.to_radians().cos()).max(1e-9);
    meters / meters_per_deg
}

/// Convert a north/south offset in meters to degrees latitude.
pub fn meters_to_lat(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

/// Linear lat/lon interpolation between two waypoints plus a drift offset.
///
/// The longitude scale of the drift uses the interpolated (pre-drift) latitude.
pub fn interpolate(
    start: &Coordinate,
    end: &Coordinate,
    progress: f64,
    drift: DriftOffset,
) -> Coordinate {
    let t = progress.clamp(0.0, 1.0);
    let base_lat = start.lat + (end.lat - start.lat) * t;
    let base_lon = start.lon + (end.lon - start.lon) * t;

    Coordinate::new(
        base_lat + meters_to_lat(drift.north_m),
        base_lon + meters_to_lon(drift.east_m, base_lat),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_coordinate(rng: &mut impl Rng) -> Coordinate {
        Coordinate::new(rng.random_range(-89.0..89.0), rng.random_range(-180.0..180.0))
    }

    #[test]
    fn test_haversine_known_distance() {
        // ~111km between these points (1 degree latitude)
        let dist = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_194.0).abs() < 100.0);
    }

    #[test]
    fn test_haversine_same_point() {
        let berlin = Coordinate::new(52.52, 13.405);
        assert!(distance_meters(&berlin, &berlin) < 0.001);
    }

    #[test]
    fn distance_is_symmetric_and_non_negative() {
        let mut rng = rand::rng();
        for _ in 0..500 {
            let a = random_coordinate(&mut rng);
            let b = random_coordinate(&mut rng);
            let ab = distance_meters(&a, &b);
            let ba = distance_meters(&b, &a);
            assert!(ab >= 0.0);
            assert!((ab - ba).abs() < 1e-6, "{ab} != {ba}");
            if a != b {
                assert!(ab > 0.0);
            }
        }
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = Coordinate::new(0.0, 0.0);
        assert!(bearing_degrees(&origin, &Coordinate::new(1.0, 0.0)).abs() < 1e-9);
        assert!((bearing_degrees(&origin, &Coordinate::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((bearing_degrees(&origin, &Coordinate::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((bearing_degrees(&origin, &Coordinate::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn heading_always_in_range() {
        let mut rng = rand::rng();
        for _ in 0..1000 {
            let a = random_coordinate(&mut rng);
            let b = random_coordinate(&mut rng);
            let heading = bearing_degrees(&a, &b);
            assert!((0.0..360.0).contains(&heading), "heading {heading}");

            let drift = wind_drift(
                rng.random_range(0.0..30.0),
                rng.random_range(-720.0..720.0),
                rng.random_range(0.0..80.0),
                heading,
            );
            assert!((0.0..360.0).contains(&drift.resultant_heading_deg));
        }
    }

    #[test]
    fn normalize_handles_negative_and_wrapping_angles() {
        assert_eq!(normalize_heading(-90.0), 270.0);
        assert_eq!(normalize_heading(720.0), 0.0);
        assert_eq!(normalize_heading(-1e-15), 0.0);
    }

    #[test]
    fn calm_wind_keeps_airspeed_and_heading() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let air = rng.random_range(1.0..80.0);
            let heading = rng.random_range(0.0..360.0);
            let drift = wind_drift(0.0, rng.random_range(0.0..360.0), air, heading);
            assert!((drift.resultant_speed_mps - air).abs() < 1e-9);
            let delta = (drift.resultant_heading_deg - heading).abs();
            assert!(delta < 1e-6 || (360.0 - delta) < 1e-6, "{heading} vs {}", drift.resultant_heading_deg);
            assert_eq!(drift.offset(1.0), DriftOffset { east_m: 0.0, north_m: 0.0 });
        }
    }

    #[test]
    fn headwind_slows_and_tailwind_speeds_up() {
        let head = wind_drift(10.0, 180.0, 50.0, 0.0);
        assert!((head.resultant_speed_mps - 40.0).abs() < 1e-9);
        let tail = wind_drift(10.0, 0.0, 50.0, 0.0);
        assert!((tail.resultant_speed_mps - 60.0).abs() < 1e-9);
    }

    #[test]
    fn crosswind_bends_track() {
        let drift = wind_drift(50.0, 90.0, 50.0, 0.0);
        assert!((drift.resultant_heading_deg - 45.0).abs() < 1e-9);
        assert!((drift.drift_x_mps - 50.0).abs() < 1e-9);
        assert!(drift.drift_y_mps.abs() < 1e-9);
    }

    #[test]
    fn interpolate_hits_endpoints_without_drift() {
        let a = Coordinate::new(52.52, 13.405);
        let b = Coordinate::new(52.524, 13.409);
        assert_eq!(interpolate(&a, &b, 0.0, DriftOffset::default()), a);
        let end = interpolate(&b, &a, 1.0, DriftOffset::default());
        assert!((end.lat - a.lat).abs() < 1e-12 && (end.lon - a.lon).abs() < 1e-12);
        let mid = interpolate(&a, &b, 0.5, DriftOffset::default());
        assert!((mid.lat - 52.522).abs() < 1e-9);
        assert!((mid.lon - 13.407).abs() < 1e-9);
    }

    #[test]
    fn interpolate_applies_drift_in_meters() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 1.0);
        let drift = DriftOffset { east_m: 111_111.0, north_m: 111_111.0 };
        let p = interpolate(&a, &b, 0.0, drift);
        assert!((p.lat - 1.0).abs() < 1e-9);
        assert!((p.lon - 1.0).abs() < 1e-9);
    }
}
