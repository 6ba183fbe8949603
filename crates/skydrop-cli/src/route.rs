//! Waypoint lists from the command line.

use anyhow::{bail, Context, Result};
use skydrop_core::{Coordinate, Route};

/// Parse `"lat,lon;lat,lon;..."` into coordinates.
///
/// Whitespace around numbers and a trailing `;` are accepted. The result is
/// checked with [`Route::new`], so fewer than two points or an out-of-range
/// coordinate is an error.
pub fn parse_route(input: &str) -> Result<Vec<Coordinate>> {
    let mut points = Vec::new();
    for (index, pair) in input
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
    {
        let Some((lat, lon)) = pair.split_once(',') else {
            bail!("waypoint {} ('{}') must be 'lat,lon'", index, pair);
        };
        let lat: f64 = lat
            .trim()
            .parse()
            .with_context(|| format!("waypoint {}: bad latitude '{}'", index, lat.trim()))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .with_context(|| format!("waypoint {}: bad longitude '{}'", index, lon.trim()))?;
        points.push(Coordinate::new(lat, lon));
    }

    Route::new(points.clone())?;
    Ok(points)
}

/// Short hop across central Berlin, covered by the built-in terrain table.
pub fn demo_route() -> Vec<Coordinate> {
    vec![
        Coordinate::new(52.5200, 13.4050),
        Coordinate::new(52.5163, 13.3777),
        Coordinate::new(52.5096, 13.3759),
    ]
}
