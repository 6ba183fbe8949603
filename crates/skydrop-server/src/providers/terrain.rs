//! Terrain lookups by nearest sample point.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use skydrop_core::{haversine_distance, TerrainSample};

/// Samples further than this from the query are treated as no data.
pub const DEFAULT_MAX_RADIUS_M: f64 = 5_000.0;

#[async_trait]
pub trait TerrainProvider: Send + Sync {
    /// Terrain near a position, `None` when there is no data for it.
    async fn lookup(&self, lat: f64, lon: f64) -> Result<Option<TerrainSample>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(flatten)]
    pub sample: TerrainSample,
}

/// Static table of surveyed terrain points.
#[derive(Debug, Clone)]
pub struct TerrainTable {
    points: Vec<TerrainPoint>,
    max_radius_m: f64,
}

impl TerrainTable {
    pub fn new(points: Vec<TerrainPoint>, max_radius_m: f64) -> Self {
        let points = points
            .into_iter()
            .filter(|p| p.lat.is_finite() && p.lon.is_finite() && p.sample.elevation_m.is_finite())
            .collect();
        Self {
            points,
            max_radius_m,
        }
    }

    /// Survey of central Berlin used when no terrain file is configured.
    pub fn berlin_sample() -> Self {
        let point = |lat, lon, elevation_m, slope_deg, surface: &str, exposure: &str, air_density| {
            TerrainPoint {
                lat,
                lon,
                sample: TerrainSample {
                    elevation_m,
                    slope_deg,
                    surface_type: surface.to_string(),
                    wind_exposure: exposure.to_string(),
                    air_density,
                },
            }
        };
        Self::new(
            vec![
                point(52.520, 13.405, 80.0, 5.0, "urban", "low", 1.2),
                point(52.521, 13.406, 120.0, 15.0, "forest", "medium", 1.15),
                point(52.522, 13.407, 180.0, 25.0, "hill", "high", 1.1),
                point(52.523, 13.408, 90.0, 10.0, "open", "low", 1.2),
                point(52.524, 13.409, 60.0, 3.0, "urban", "low", 1.21),
            ],
            DEFAULT_MAX_RADIUS_M,
        )
    }

    /// Load a JSON array of terrain points.
    pub fn from_json_file(path: impl AsRef<Path>, max_radius_m: f64) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading terrain file {}", path.display()))?;
        let points: Vec<TerrainPoint> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing terrain file {}", path.display()))?;
        Ok(Self::new(points, max_radius_m))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn nearest(&self, lat: f64, lon: f64) -> Option<&TerrainPoint> {
        self.points
            .iter()
            .map(|p| (p, haversine_distance(lat, lon, p.lat, p.lon)))
            .filter(|(_, d)| *d <= self.max_radius_m)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(p, _)| p)
    }
}

#[async_trait]
impl TerrainProvider for TerrainTable {
    async fn lookup(&self, lat: f64, lon: f64) -> Result<Option<TerrainSample>> {
        Ok(self.nearest(lat, lon).map(|p| p.sample.clone()))
    }
}
