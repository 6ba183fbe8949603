//! Mission runner: the single task that owns and ticks one mission.
//!
//! Control commands arrive on an mpsc channel and are applied between ticks,
//! so a tick never overlaps a command or another tick of the same mission.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use skydrop_core::{
    eta, ControlState, MissionPhase, MissionState, MissionStatus, PhaseController, TickInputs,
    WeatherReport,
};

use crate::config::Config;
use crate::error::ControlError;
use crate::persistence::MissionStore;
use crate::providers::{Conditions, TerrainProvider, WeatherProvider};
use crate::telemetry::{build_snapshot, TelemetryEmitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    Pause,
    Resume,
    Abort,
    Cancel,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::Pause => "pause",
            ControlCommand::Resume => "resume",
            ControlCommand::Abort => "abort",
            ControlCommand::Cancel => "cancel",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "abort" => Some(Self::Abort),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status after the command was applied, or why it was refused.
pub type ControlReply = Result<MissionStatus, ControlError>;

#[derive(Debug)]
pub struct ControlRequest {
    pub command: ControlCommand,
    pub reply: oneshot::Sender<ControlReply>,
}

/// External services shared by all runners.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn MissionStore>,
    pub weather: Arc<dyn WeatherProvider>,
    pub terrain: Arc<dyn TerrainProvider>,
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Wall-clock time between ticks
    pub tick_interval: Duration,
    /// Simulated seconds per tick
    pub sim_seconds_per_tick: f64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            sim_seconds_per_tick: 1.0,
        }
    }
}

impl RunnerSettings {
    /// Problems that would stop a mission from ever finishing (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !(self.sim_seconds_per_tick.is_finite() && self.sim_seconds_per_tick > 0.0) {
            problems.push(format!(
                "simulated seconds per tick must be positive, got {}",
                self.sim_seconds_per_tick
            ));
        }
        if self.tick_interval.is_zero() {
            problems.push("tick interval must be non-zero".to_string());
        }
        problems
    }
}

impl From<&Config> for RunnerSettings {
    fn from(config: &Config) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            sim_seconds_per_tick: config.sim_seconds_per_tick,
        }
    }
}

pub struct MissionRunner {
    state: MissionState,
    controller: PhaseController,
    settings: RunnerSettings,
    collaborators: Collaborators,
    emitter: TelemetryEmitter,
    commands: mpsc::Receiver<ControlRequest>,
    status_tx: watch::Sender<MissionStatus>,
    /// Status to restore on resume; `Some` while paused.
    paused_from: Option<MissionStatus>,
    cancel_on_resume: bool,
    conditions: Conditions,
    last_weather: Option<WeatherReport>,
    last_elevation_m: Option<f64>,
    weather_failing: bool,
    terrain_failing: bool,
}

impl MissionRunner {
    pub fn new(
        state: MissionState,
        controller: PhaseController,
        settings: RunnerSettings,
        collaborators: Collaborators,
        emitter: TelemetryEmitter,
        commands: mpsc::Receiver<ControlRequest>,
        status_tx: watch::Sender<MissionStatus>,
    ) -> Self {
        Self {
            state,
            controller,
            settings,
            collaborators,
            emitter,
            commands,
            status_tx,
            paused_from: None,
            cancel_on_resume: false,
            conditions: Conditions::calm(),
            last_weather: None,
            last_elevation_m: None,
            weather_failing: false,
            terrain_failing: false,
        }
    }

    /// Seed the runner with the report from the pre-flight check.
    pub fn with_weather(mut self, report: WeatherReport) -> Self {
        self.conditions.weather = report.clone();
        self.last_weather = Some(report);
        self
    }

    /// Tick the mission until it reaches a terminal status, then return its final state.
    pub async fn run(mut self) -> MissionState {
        info!(
            mission_id = %self.state.id,
            drone_id = %self.state.drone_id,
            waypoints = self.state.route.len(),
            "Mission runner started"
        );
        self.emitter.dispatched(&self.state);
        self.publish().await;

        let period = self.settings.tick_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.state.is_terminal() {
            let paused = self.paused_from.is_some();
            tokio::select! {
                biased;
                request = self.commands.recv() => match request {
                    Some(ControlRequest { command, reply }) => {
                        let result = self.apply(command).await;
                        // Caller may have given up waiting; the command still applied.
                        let _ = reply.send(result);
                        if paused && self.paused_from.is_none() {
                            // No catch-up burst after a long pause.
                            ticker.reset();
                        }
                    }
                    None => {
                        warn!("Control channel for mission {} closed, aborting", self.state.id);
                        self.state.abort(Utc::now());
                        self.publish().await;
                    }
                },
                _ = ticker.tick(), if !paused => {
                    self.tick().await;
                }
            }
        }

        info!(
            mission_id = %self.state.id,
            status = %self.state.status,
            battery = self.state.battery_percent,
            "Mission runner finished"
        );
        self.state
    }

    async fn tick(&mut self) {
        self.conditions = self.observe().await;
        let now = Utc::now();
        let inputs = TickInputs {
            wind_speed_mps: self.conditions.weather.wind_speed_mps,
            wind_direction_deg: self.conditions.weather.wind_direction_deg,
            terrain_elevation_m: self.conditions.terrain_elevation_m,
            dt_s: self.settings.sim_seconds_per_tick,
            now,
        };

        match self.controller.tick(&mut self.state, &inputs) {
            Ok(outcome) => {
                if outcome.turned_back {
                    info!("Mission {} turned back toward origin", self.state.id);
                }
                if let Some(transition) = outcome.transition {
                    info!(
                        mission_id = %self.state.id,
                        from = %transition.from,
                        to = %transition.to,
                        "Phase transition"
                    );
                }
                if outcome.completed {
                    info!("Mission {} landed", self.state.id);
                }
            }
            Err(err) => {
                error!("Mission {} failed: {}", self.state.id, err);
                self.state.fail(now);
            }
        }

        self.publish().await;
    }

    /// Weather and terrain at the current position, with fallbacks.
    async fn observe(&mut self) -> Conditions {
        let position = self.state.position;

        let (weather, weather_stale) =
            match self.collaborators.weather.check(position.lat, position.lon).await {
                Ok(report) => {
                    if self.weather_failing {
                        info!("Weather lookups for mission {} recovered", self.state.id);
                        self.weather_failing = false;
                    }
                    self.last_weather = Some(report.clone());
                    (report, false)
                }
                Err(err) => {
                    if !self.weather_failing {
                        warn!(
                            "Weather lookup for mission {} failed, using last known: {}",
                            self.state.id, err
                        );
                        self.weather_failing = true;
                    }
                    let fallback = self.last_weather.clone().unwrap_or_else(WeatherReport::calm);
                    (fallback, true)
                }
            };

        let (terrain_elevation_m, terrain_available) =
            match self.collaborators.terrain.lookup(position.lat, position.lon).await {
                Ok(sample) => {
                    self.terrain_failing = false;
                    let elevation = sample.map(|s| s.elevation_m);
                    if elevation.is_some() {
                        self.last_elevation_m = elevation;
                    }
                    (elevation, elevation.is_some())
                }
                Err(err) => {
                    if !self.terrain_failing {
                        warn!(
                            "Terrain lookup for mission {} failed, using last known: {}",
                            self.state.id, err
                        );
                        self.terrain_failing = true;
                    }
                    (self.last_elevation_m, false)
                }
            };

        Conditions {
            weather,
            weather_stale,
            terrain_elevation_m,
            terrain_available,
        }
    }

    async fn apply(&mut self, command: ControlCommand) -> ControlReply {
        match command {
            ControlCommand::Pause => {
                if self.paused_from.is_some() {
                    return Ok(MissionStatus::Paused);
                }
                self.paused_from = Some(self.state.status);
                if self.state.control == ControlState::CancelRequested {
                    self.cancel_on_resume = true;
                }
                self.state.status = MissionStatus::Paused;
                self.state.control = ControlState::Paused;
                info!("Mission {} paused", self.state.id);
                self.publish().await;
                Ok(MissionStatus::Paused)
            }
            ControlCommand::Resume => {
                let Some(previous) = self.paused_from.take() else {
                    return Ok(self.state.status);
                };
                self.state.status = previous;
                self.state.control = if std::mem::take(&mut self.cancel_on_resume) {
                    ControlState::CancelRequested
                } else {
                    ControlState::Running
                };
                info!("Mission {} resumed", self.state.id);
                self.publish().await;
                Ok(previous)
            }
            ControlCommand::Abort => {
                self.paused_from = None;
                self.state.abort(Utc::now());
                warn!(
                    mission_id = %self.state.id,
                    phase = %self.state.phase,
                    altitude_m = self.state.altitude_m,
                    "Mission aborted in place"
                );
                self.publish().await;
                Ok(MissionStatus::Aborted)
            }
            ControlCommand::Cancel => {
                if self.state.phase == MissionPhase::Landing {
                    return Err(ControlError::InvalidState {
                        reason: "mission is already landing".to_string(),
                    });
                }
                if self.paused_from.is_some() {
                    self.cancel_on_resume = true;
                } else if self.state.control != ControlState::CancelRequested {
                    self.state.control = ControlState::CancelRequested;
                    info!("Mission {} cancel requested", self.state.id);
                }
                Ok(self.state.status)
            }
        }
    }

    async fn publish(&mut self) {
        let estimate = eta::estimate(&self.state, self.controller.profile());
        let snapshot = build_snapshot(&self.state, &estimate, &self.conditions, Utc::now());
        self.emitter.emit(&self.state, &snapshot).await;
        self.status_tx.send_replace(self.state.status);
    }
}
