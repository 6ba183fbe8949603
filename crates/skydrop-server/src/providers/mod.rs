//! Weather and terrain collaborators consulted by mission runners.

pub mod terrain;
pub mod weather;

pub use terrain::{TerrainPoint, TerrainProvider, TerrainTable};
pub use weather::{CachedWeather, OpenWeatherProvider, StaticWeather, WeatherProvider};

use skydrop_core::WeatherReport;

/// Environment a runner observed for one tick, after fallbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditions {
    pub weather: WeatherReport,
    /// The report is a fallback rather than a fresh lookup.
    pub weather_stale: bool,
    pub terrain_elevation_m: Option<f64>,
    /// Terrain data was found for this position on this tick.
    pub terrain_available: bool,
}

impl Conditions {
    pub fn calm() -> Self {
        Self {
            weather: WeatherReport::calm(),
            weather_stale: false,
            terrain_elevation_m: None,
            terrain_available: false,
        }
    }
}
