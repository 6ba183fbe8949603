//! Server configuration from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use skydrop_core::FlightProfile;

use crate::runner::RunnerSettings;

const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Wall-clock interval between mission ticks
    pub tick_interval_ms: u64,
    /// Simulated seconds covered by one tick
    pub sim_seconds_per_tick: f64,
    /// SQLite file; empty keeps missions in memory only
    pub database_path: String,
    pub database_max_connections: u32,
    /// Without a key the server uses static nominal weather
    pub openweather_api_key: Option<String>,
    pub weather_url: String,
    pub weather_timeout_s: u64,
    pub weather_cache_ttl_s: u64,
    /// JSON terrain table; the built-in sample is used when unset
    pub terrain_file: Option<String>,
    /// Per-mission telemetry channel capacity
    pub telemetry_buffer: usize,
    pub log_json: bool,
    pub profile: FlightProfile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            tick_interval_ms: 1000,
            sim_seconds_per_tick: 1.0,
            database_path: String::new(),
            database_max_connections: 5,
            openweather_api_key: None,
            weather_url: DEFAULT_WEATHER_URL.to_string(),
            weather_timeout_s: 5,
            weather_cache_ttl_s: 60,
            terrain_file: None,
            telemetry_buffer: 64,
            log_json: false,
            profile: FlightProfile::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let tick_interval_ms = env_parse("SKYDROP_TICK_MS", defaults.tick_interval_ms).max(1);

        let mut profile = defaults.profile.clone();
        profile.cruise_speed_mps = env_parse("SKYDROP_DRONE_SPEED_MPS", profile.cruise_speed_mps);
        profile.min_altitude_m = env_parse("SKYDROP_MIN_ALTITUDE_M", profile.min_altitude_m);
        profile.battery_drain_per_tick =
            env_parse("SKYDROP_BATTERY_DRAIN_PER_TICK", profile.battery_drain_per_tick);
        profile.payload_drain_factor =
            env_parse("SKYDROP_PAYLOAD_DRAIN_FACTOR", profile.payload_drain_factor);

        Self {
            server_port: env_parse("SKYDROP_PORT", defaults.server_port),
            tick_interval_ms,
            sim_seconds_per_tick: env_parse(
                "SKYDROP_SIM_SECONDS_PER_TICK",
                tick_interval_ms as f64 / 1000.0,
            ),
            database_path: env::var("SKYDROP_DATABASE_PATH").unwrap_or_default(),
            database_max_connections: env_parse(
                "SKYDROP_DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            openweather_api_key: env_non_empty("OPENWEATHER_API_KEY"),
            weather_url: env_non_empty("SKYDROP_WEATHER_URL").unwrap_or(defaults.weather_url),
            weather_timeout_s: env_parse("SKYDROP_WEATHER_TIMEOUT_S", defaults.weather_timeout_s),
            weather_cache_ttl_s: env_parse(
                "SKYDROP_WEATHER_CACHE_TTL_S",
                defaults.weather_cache_ttl_s,
            ),
            terrain_file: env_non_empty("SKYDROP_TERRAIN_FILE"),
            telemetry_buffer: env_parse("SKYDROP_TELEMETRY_BUFFER", defaults.telemetry_buffer)
                .max(1),
            log_json: env_bool("SKYDROP_LOG_JSON"),
            profile,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn weather_timeout(&self) -> Duration {
        Duration::from_secs(self.weather_timeout_s.max(1))
    }

    pub fn weather_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.weather_cache_ttl_s)
    }

    /// Returns list of configuration problems (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.profile.validate();
        errors.extend(
            RunnerSettings::from(self)
                .validate()
                .into_iter()
                .map(|problem| format!("SKYDROP_SIM_SECONDS_PER_TICK/SKYDROP_TICK_MS: {problem}")),
        );
        if self.database_max_connections == 0 {
            errors.push("SKYDROP_DATABASE_MAX_CONNECTIONS must be at least 1".to_string());
        }
        errors
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_bool(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
