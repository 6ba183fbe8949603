//! Shared application state handed to every HTTP handler.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::coordinator::MissionCoordinator;
use crate::fleet::FleetRegistry;
use crate::persistence::{self, InMemoryMissionStore, MissionStore, SqliteMissionStore};
use crate::providers::{
    terrain::DEFAULT_MAX_RADIUS_M, CachedWeather, OpenWeatherProvider, StaticWeather,
    TerrainProvider, TerrainTable, WeatherProvider,
};
use crate::runner::{Collaborators, RunnerSettings};
use crate::telemetry::TelemetryHub;

const FLEET_EVENT_BUFFER: usize = 256;

pub struct AppState {
    config: Config,
    pub coordinator: MissionCoordinator,
    pub fleet: Arc<FleetRegistry>,
}

impl AppState {
    pub fn new(config: Config, collaborators: Collaborators, fleet: Arc<FleetRegistry>) -> Self {
        let hub = Arc::new(TelemetryHub::new(config.telemetry_buffer));
        let (fleet_tx, _) = broadcast::channel(FLEET_EVENT_BUFFER);
        let coordinator = MissionCoordinator::new(
            collaborators,
            hub,
            fleet_tx,
            config.profile.clone(),
            RunnerSettings::from(&config),
        );
        Self {
            config,
            coordinator,
            fleet,
        }
    }

    /// Build collaborators from configuration: SQLite or in-memory store,
    /// OpenWeather or static weather, terrain file or the built-in table.
    pub async fn from_config(config: Config) -> Result<Self> {
        let store: Arc<dyn MissionStore> = if config.database_path.is_empty() {
            tracing::info!("No database configured, keeping missions in memory");
            Arc::new(InMemoryMissionStore::new())
        } else {
            let db = persistence::init_database(
                &config.database_path,
                config.database_max_connections,
            )
            .await?;
            Arc::new(SqliteMissionStore::new(db))
        };

        let weather: Arc<dyn WeatherProvider> = match &config.openweather_api_key {
            Some(api_key) => {
                let client = reqwest::Client::builder()
                    .connect_timeout(Duration::from_secs(3))
                    .build()?;
                let provider = OpenWeatherProvider::new(
                    client,
                    config.weather_url.clone(),
                    api_key.clone(),
                    config.weather_timeout(),
                );
                Arc::new(CachedWeather::new(provider, config.weather_cache_ttl()))
            }
            None => {
                tracing::info!("OPENWEATHER_API_KEY not set, using static nominal weather");
                Arc::new(StaticWeather::nominal())
            }
        };

        let table = match &config.terrain_file {
            Some(path) => TerrainTable::from_json_file(path, DEFAULT_MAX_RADIUS_M)?,
            None => TerrainTable::berlin_sample(),
        };
        if table.is_empty() {
            tracing::warn!("Terrain table has no points, altitude will follow sea level");
        } else {
            tracing::info!("Terrain table loaded with {} points", table.len());
        }
        let terrain: Arc<dyn TerrainProvider> = Arc::new(table);

        let collaborators = Collaborators {
            store,
            weather,
            terrain,
        };
        Ok(Self::new(
            config,
            collaborators,
            Arc::new(FleetRegistry::with_sample_fleet()),
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
