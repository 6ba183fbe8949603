//! Weather lookups and the pre-flight safety assessment.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

use skydrop_core::{normalize_heading, WeatherReport};

use crate::cache::{prune_cache, CacheEntry};

/// Sustained wind above this grounds the fleet.
pub const MAX_SAFE_WIND_MPS: f64 = 15.0;
/// Visibility below this grounds the fleet.
pub const MIN_SAFE_VISIBILITY_M: f64 = 1000.0;

const CACHE_MAX_ENTRIES: usize = 512;

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn check(&self, lat: f64, lon: f64) -> Result<WeatherReport>;
}

/// Decide whether conditions allow a flight. Returns the reason when they don't.
pub fn assess(wind_speed_mps: f64, visibility_m: f64, conditions: &[String]) -> (bool, String) {
    if conditions
        .iter()
        .any(|c| c.eq_ignore_ascii_case("thunderstorm"))
    {
        return (false, "thunderstorm in the area".to_string());
    }
    if wind_speed_mps > MAX_SAFE_WIND_MPS {
        return (
            false,
            format!("wind {wind_speed_mps:.1} m/s exceeds {MAX_SAFE_WIND_MPS} m/s"),
        );
    }
    if visibility_m < MIN_SAFE_VISIBILITY_M {
        return (
            false,
            format!("visibility {visibility_m:.0} m below {MIN_SAFE_VISIBILITY_M} m"),
        );
    }
    (true, String::new())
}

/// Fixed report for every location.
#[derive(Debug, Clone)]
pub struct StaticWeather {
    report: WeatherReport,
}

impl StaticWeather {
    pub fn new(report: WeatherReport) -> Self {
        Self { report }
    }

    /// Moderate breeze blowing toward the northeast, with good visibility.
    pub fn nominal() -> Self {
        Self::new(WeatherReport {
            wind_speed_mps: 12.0,
            wind_direction_deg: 45.0,
            visibility_m: 8000.0,
            is_safe: true,
            reason: String::new(),
        })
    }
}

#[async_trait]
impl WeatherProvider for StaticWeather {
    async fn check(&self, _lat: f64, _lon: f64) -> Result<WeatherReport> {
        Ok(self.report.clone())
    }
}

#[derive(Debug, Deserialize)]
struct OpenWeatherResponse {
    #[serde(default)]
    weather: Vec<OpenWeatherCondition>,
    visibility: Option<f64>,
    wind: Option<OpenWeatherWind>,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherCondition {
    main: String,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherWind {
    speed: f64,
    /// Meteorological direction: where the wind comes from.
    #[serde(default)]
    deg: f64,
}

impl From<OpenWeatherResponse> for WeatherReport {
    fn from(response: OpenWeatherResponse) -> Self {
        let (wind_speed_mps, wind_direction_deg) = response
            .wind
            .map(|w| (w.speed, normalize_heading(w.deg + 180.0)))
            .unwrap_or((0.0, 0.0));
        // OpenWeather omits visibility when it is at the 10 km cap
        let visibility_m = response.visibility.unwrap_or(10_000.0);
        let conditions: Vec<String> = response.weather.into_iter().map(|c| c.main).collect();
        let (is_safe, reason) = assess(wind_speed_mps, visibility_m, &conditions);

        WeatherReport {
            wind_speed_mps,
            wind_direction_deg,
            visibility_m,
            is_safe,
            reason,
        }
    }
}

/// Current weather from the OpenWeatherMap API.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenWeatherProvider {
    pub fn new(client: Client, base_url: String, api_key: String, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            api_key,
            timeout,
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn check(&self, lat: f64, lon: f64) -> Result<WeatherReport> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .context("weather request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("weather provider HTTP {}", response.status());
        }

        let payload: OpenWeatherResponse = response
            .json()
            .await
            .context("weather response was not valid JSON")?;
        Ok(payload.into())
    }
}

#[derive(Debug, Clone)]
struct CachedReport {
    fetched_at: Instant,
    report: WeatherReport,
}

impl CacheEntry for CachedReport {
    fn recorded_at(&self) -> Instant {
        self.fetched_at
    }
}

/// Caches another provider's reports on a ~1 km grid.
pub struct CachedWeather<P> {
    inner: P,
    ttl: Duration,
    entries: DashMap<(i64, i64), CachedReport>,
}

impl<P: WeatherProvider> CachedWeather<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    fn key(lat: f64, lon: f64) -> (i64, i64) {
        ((lat * 100.0).round() as i64, (lon * 100.0).round() as i64)
    }
}

#[async_trait]
impl<P: WeatherProvider> WeatherProvider for CachedWeather<P> {
    async fn check(&self, lat: f64, lon: f64) -> Result<WeatherReport> {
        let key = Self::key(lat, lon);
        if let Some(entry) = self.entries.get(&key) {
            if entry.fetched_at.elapsed() <= self.ttl {
                return Ok(entry.report.clone());
            }
        }

        let report = self.inner.check(lat, lon).await?;
        self.entries.insert(
            key,
            CachedReport {
                fetched_at: Instant::now(),
                report: report.clone(),
            },
        );
        if self.entries.len() > CACHE_MAX_ENTRIES {
            prune_cache(&self.entries, CACHE_MAX_ENTRIES, self.ttl);
        }
        Ok(report)
    }
}
