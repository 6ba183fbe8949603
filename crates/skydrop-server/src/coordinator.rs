//! Registry of active mission runners.
//!
//! The coordinator validates start requests, spawns one runner task per
//! mission, and routes control commands to it. A mission id maps to at most
//! one live runner; the entry is removed when the runner retires.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{info, warn};
use uuid::Uuid;

use skydrop_core::{
    eta, Coordinate, DroneEvent, FlightProfile, MissionRecord, MissionState, MissionStatus,
    PhaseController, Route, TelemetrySnapshot,
};

use crate::cache::{prune_cache, CacheEntry};
use crate::error::{ControlError, StartError};
use crate::runner::{
    Collaborators, ControlCommand, ControlReply, ControlRequest, MissionRunner, RunnerSettings,
};
use crate::telemetry::{TelemetryEmitter, TelemetryHub};

const COMMAND_BUFFER: usize = 16;
/// Retired missions remembered in memory; older ones are answered from the store.
const RETIRED_MAX_ENTRIES: usize = 1024;
const RETIRED_MAX_AGE: Duration = Duration::from_secs(6 * 60 * 60);

/// Request to launch a mission.
#[derive(Debug, Clone, Deserialize)]
pub struct StartMission {
    /// Generated when absent
    #[serde(default)]
    pub mission_id: Option<String>,
    pub drone_id: String,
    pub route: Vec<Coordinate>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone)]
struct RunnerHandle {
    commands: mpsc::Sender<ControlRequest>,
    status: watch::Receiver<MissionStatus>,
    drone_id: String,
}

#[derive(Debug, Clone, Copy)]
struct RetiredMission {
    status: MissionStatus,
    retired_at: Instant,
}

impl CacheEntry for RetiredMission {
    fn recorded_at(&self) -> Instant {
        self.retired_at
    }
}

pub struct MissionCoordinator {
    runners: Arc<DashMap<String, RunnerHandle>>,
    /// Final status of runners retired since startup.
    finished: Arc<DashMap<String, RetiredMission>>,
    collaborators: Collaborators,
    hub: Arc<TelemetryHub>,
    fleet_tx: broadcast::Sender<DroneEvent>,
    controller: PhaseController,
    settings: RunnerSettings,
}

impl MissionCoordinator {
    pub fn new(
        collaborators: Collaborators,
        hub: Arc<TelemetryHub>,
        fleet_tx: broadcast::Sender<DroneEvent>,
        profile: FlightProfile,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            runners: Arc::new(DashMap::new()),
            finished: Arc::new(DashMap::new()),
            collaborators,
            hub,
            fleet_tx,
            controller: PhaseController::new(profile),
            settings,
        }
    }

    /// Validate, run the weather gate, and spawn the mission's runner.
    ///
    /// A refused start closes any telemetry stream opened for the requested id.
    pub async fn start(&self, request: StartMission) -> Result<String, StartError> {
        let requested_id = request
            .mission_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let result = self.launch(request).await;
        if let (Err(err), Some(id)) = (&result, requested_id) {
            if !matches!(err, StartError::AlreadyActive(_)) && !self.runners.contains_key(&id) {
                self.hub.close(&id);
            }
        }
        result
    }

    async fn launch(&self, request: StartMission) -> Result<String, StartError> {
        let route = Route::new(request.route)?;
        let drone_id = request.drone_id.trim().to_string();
        if drone_id.is_empty() {
            return Err(StartError::MissingDrone);
        }
        let mission_id = request
            .mission_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.runners.contains_key(&mission_id) {
            return Err(StartError::AlreadyActive(mission_id));
        }

        let origin = route.first();
        let weather = self
            .collaborators
            .weather
            .check(origin.lat, origin.lon)
            .await
            .map_err(|err| {
                warn!("Pre-flight weather check for {} failed: {}", mission_id, err);
                StartError::WeatherUnavailable(err.to_string())
            })?;
        if !weather.is_safe {
            let reason = if weather.reason.is_empty() {
                "provider reported unsafe conditions".to_string()
            } else {
                weather.reason.clone()
            };
            info!("Mission {} refused: {}", mission_id, reason);
            return Err(StartError::UnsafeWeather { reason });
        }

        let state = MissionState::new(&mission_id, &drone_id, route, Utc::now())
            .with_name(request.name);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(state.status);

        match self.runners.entry(mission_id.clone()) {
            Entry::Occupied(_) => return Err(StartError::AlreadyActive(mission_id)),
            Entry::Vacant(slot) => {
                slot.insert(RunnerHandle {
                    commands: command_tx.clone(),
                    status: status_rx,
                    drone_id: drone_id.clone(),
                });
            }
        }
        self.finished.remove(&mission_id);
        self.hub.open(&mission_id);

        let estimate = eta::estimate(&state, self.controller.profile());
        if let Err(err) = self.collaborators.store.create(&state.to_record(estimate.eta_s)).await {
            warn!("Failed to persist new mission {}: {}", mission_id, err);
        }

        let emitter = TelemetryEmitter::new(
            self.hub.clone(),
            self.collaborators.store.clone(),
            self.fleet_tx.clone(),
        );
        let runner = MissionRunner::new(
            state,
            self.controller.clone(),
            self.settings.clone(),
            self.collaborators.clone(),
            emitter,
            command_rx,
            status_tx,
        )
        .with_weather(weather);

        let runners = self.runners.clone();
        let finished = self.finished.clone();
        let hub = self.hub.clone();
        let id = mission_id.clone();
        tokio::spawn(async move {
            let final_state = runner.run().await;
            finished.insert(
                id.clone(),
                RetiredMission {
                    status: final_state.status,
                    retired_at: Instant::now(),
                },
            );
            prune_cache(&finished, RETIRED_MAX_ENTRIES, RETIRED_MAX_AGE);
            // Close while the id is still registered so a restart cannot lose its channel.
            hub.close(&id);
            runners.remove_if(&id, |_, handle| handle.commands.same_channel(&command_tx));
            info!(mission_id = %id, status = %final_state.status, "Mission runner retired");
        });

        info!(mission_id = %mission_id, drone_id = %drone_id, "Mission started");
        Ok(mission_id)
    }

    pub async fn pause(&self, mission_id: &str) -> ControlReply {
        self.control(mission_id, ControlCommand::Pause).await
    }

    pub async fn resume(&self, mission_id: &str) -> ControlReply {
        self.control(mission_id, ControlCommand::Resume).await
    }

    pub async fn abort(&self, mission_id: &str) -> ControlReply {
        self.control(mission_id, ControlCommand::Abort).await
    }

    pub async fn cancel(&self, mission_id: &str) -> ControlReply {
        self.control(mission_id, ControlCommand::Cancel).await
    }

    /// Deliver a command to the mission's runner and wait for it to be applied.
    pub async fn control(&self, mission_id: &str, command: ControlCommand) -> ControlReply {
        let handle = self.runners.get(mission_id).map(|h| h.value().clone());
        let Some(handle) = handle else {
            return self.retired_reply(mission_id, command).await;
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = ControlRequest {
            command,
            reply: reply_tx,
        };
        if handle.commands.send(request).await.is_err() {
            // Runner retired between lookup and send.
            return finished_reply(*handle.status.borrow(), command);
        }
        match reply_rx.await {
            Ok(reply) => reply,
            Err(_) => finished_reply(*handle.status.borrow(), command),
        }
    }

    async fn retired_reply(&self, mission_id: &str, command: ControlCommand) -> ControlReply {
        if let Some(status) = self.finished.get(mission_id).map(|r| r.status) {
            return finished_reply(status, command);
        }
        match self.collaborators.store.get(mission_id).await {
            Ok(Some(record)) => finished_reply(record.status, command),
            Ok(None) => Err(ControlError::NotFound(mission_id.to_string())),
            Err(err) => {
                warn!("Store lookup for mission {} failed: {}", mission_id, err);
                Err(ControlError::NotFound(mission_id.to_string()))
            }
        }
    }

    pub fn is_active(&self, mission_id: &str) -> bool {
        self.runners.contains_key(mission_id)
    }

    /// Ids of missions with a live runner, sorted.
    pub fn active_missions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runners.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Drone flying an active mission.
    pub fn drone_for(&self, mission_id: &str) -> Option<String> {
        self.runners.get(mission_id).map(|h| h.drone_id.clone())
    }

    /// Live status of an active mission, or the final status of a retired one.
    pub fn status(&self, mission_id: &str) -> Option<MissionStatus> {
        if let Some(handle) = self.runners.get(mission_id) {
            return Some(*handle.status.borrow());
        }
        self.finished.get(mission_id).map(|r| r.status)
    }

    pub async fn get(&self, mission_id: &str) -> anyhow::Result<Option<MissionRecord>> {
        self.collaborators.store.get(mission_id).await
    }

    pub async fn list(&self) -> anyhow::Result<Vec<MissionRecord>> {
        self.collaborators.store.list_all().await
    }

    pub fn subscribe(&self, mission_id: &str) -> broadcast::Receiver<TelemetrySnapshot> {
        self.hub.subscribe(mission_id)
    }

    /// Join the stream of a running mission; `None` once it has retired.
    pub fn watch(&self, mission_id: &str) -> Option<broadcast::Receiver<TelemetrySnapshot>> {
        self.hub.join(mission_id)
    }

    pub fn latest_snapshot(&self, mission_id: &str) -> Option<TelemetrySnapshot> {
        self.hub.latest(mission_id)
    }

    pub fn fleet_events(&self) -> broadcast::Receiver<DroneEvent> {
        self.fleet_tx.subscribe()
    }

    /// Abort every active mission.
    pub async fn shutdown(&self) {
        let ids = self.active_missions();
        if ids.is_empty() {
            return;
        }
        info!("Aborting {} active missions", ids.len());
        let results = join_all(ids.iter().map(|id| self.abort(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(err) = result {
                warn!("Abort of mission {} during shutdown failed: {}", id, err);
            }
        }
    }
}

/// Reply for a command addressed to a runner that no longer exists.
fn finished_reply(status: MissionStatus, command: ControlCommand) -> ControlReply {
    if command == ControlCommand::Abort && status == MissionStatus::Aborted {
        Ok(status)
    } else {
        Err(ControlError::NotActive { status })
    }
}
