//! Telemetry fan-out and per-mission checkpointing.
//!
//! Every mission has one broadcast channel in the [`TelemetryHub`]. Only the
//! mission's runner publishes into it, so subscribers see snapshots of one
//! mission in publish order.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use skydrop_core::{
    DroneEvent, DroneEventKind, Estimate, MissionPatch, MissionState, MissionStatus,
    TelemetrySnapshot,
};

use crate::backoff::Backoff;
use crate::persistence::MissionStore;
use crate::providers::Conditions;

const CHECKPOINT_BACKOFF_BASE_SECS: u64 = 1;
const CHECKPOINT_BACKOFF_MAX_SECS: u64 = 30;

pub trait TelemetryPublisher: Send + Sync {
    fn publish(&self, mission_id: &str, snapshot: &TelemetrySnapshot);
}

/// Per-mission broadcast channels keyed by mission id.
pub struct TelemetryHub {
    channels: DashMap<String, broadcast::Sender<TelemetrySnapshot>>,
    latest: DashMap<String, TelemetrySnapshot>,
    capacity: usize,
}

impl TelemetryHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            latest: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Join a mission's stream, opening the channel if needed. Works before
    /// the mission starts; the channel goes away when the mission retires or
    /// its start is refused.
    pub fn subscribe(&self, mission_id: &str) -> broadcast::Receiver<TelemetrySnapshot> {
        self.channels
            .entry(mission_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Make sure a started mission has a channel to publish on.
    pub fn open(&self, mission_id: &str) {
        self.channels
            .entry(mission_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
    }

    /// Join only if the mission's channel is open.
    pub fn join(&self, mission_id: &str) -> Option<broadcast::Receiver<TelemetrySnapshot>> {
        self.channels.get(mission_id).map(|tx| tx.subscribe())
    }

    /// Drop the mission's channel. Subscribers drain what is buffered, then see it closed.
    pub fn close(&self, mission_id: &str) {
        self.channels.remove(mission_id);
        self.latest.remove(mission_id);
    }

    /// Most recent snapshot published for a mission that is still running.
    pub fn latest(&self, mission_id: &str) -> Option<TelemetrySnapshot> {
        self.latest.get(mission_id).map(|s| s.value().clone())
    }

    pub fn subscriber_count(&self, mission_id: &str) -> usize {
        self.channels
            .get(mission_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl TelemetryPublisher for TelemetryHub {
    fn publish(&self, mission_id: &str, snapshot: &TelemetrySnapshot) {
        self.latest.insert(mission_id.to_string(), snapshot.clone());
        if let Some(tx) = self.channels.get(mission_id) {
            // No receivers is fine; nobody is watching this mission.
            let _ = tx.send(snapshot.clone());
        }
    }
}

/// Build the published view of a mission.
pub fn build_snapshot(
    state: &MissionState,
    estimate: &Estimate,
    conditions: &Conditions,
    timestamp: DateTime<Utc>,
) -> TelemetrySnapshot {
    TelemetrySnapshot {
        mission_id: state.id.clone(),
        drone_id: state.drone_id.clone(),
        position: state.position,
        altitude_m: state.altitude_m,
        phase: state.phase,
        status: state.status,
        control: state.control,
        current_step: state.current_step,
        battery_percent: state.battery_percent,
        eta_s: estimate.eta_s,
        distance_remaining_m: estimate.distance_remaining_m,
        heading_deg: state.heading_deg,
        ground_speed_mps: state.ground_speed_mps,
        wind_speed_mps: conditions.weather.wind_speed_mps,
        wind_direction_deg: conditions.weather.wind_direction_deg,
        weather_stale: conditions.weather_stale,
        terrain_available: conditions.terrain_available,
        timestamp,
    }
}

/// Publishes one mission's snapshots, mirrors them to the store, and tells
/// the fleet what its drone is doing.
pub struct TelemetryEmitter {
    publisher: Arc<dyn TelemetryPublisher>,
    store: Arc<dyn MissionStore>,
    fleet_tx: broadcast::Sender<DroneEvent>,
    backoff: Backoff,
    last_status: Option<MissionStatus>,
}

impl TelemetryEmitter {
    pub fn new(
        publisher: Arc<dyn TelemetryPublisher>,
        store: Arc<dyn MissionStore>,
        fleet_tx: broadcast::Sender<DroneEvent>,
    ) -> Self {
        Self {
            publisher,
            store,
            fleet_tx,
            backoff: Backoff::new(
                Duration::from_secs(CHECKPOINT_BACKOFF_BASE_SECS),
                Duration::from_secs(CHECKPOINT_BACKOFF_MAX_SECS),
            ),
            last_status: None,
        }
    }

    /// Announce the drone as taken by this mission.
    pub fn dispatched(&mut self, state: &MissionState) {
        self.last_status = Some(state.status);
        self.drone_event(state, DroneEventKind::Dispatched, Utc::now());
    }

    /// Publish a snapshot and request a checkpoint for it.
    pub async fn emit(&mut self, state: &MissionState, snapshot: &TelemetrySnapshot) {
        self.publisher.publish(&state.id, snapshot);
        tracing::debug!(
            mission_id = %state.id,
            phase = %snapshot.phase,
            status = %snapshot.status,
            step = snapshot.current_step,
            altitude_m = snapshot.altitude_m,
            battery = snapshot.battery_percent,
            eta_s = snapshot.eta_s,
            "telemetry"
        );

        let kind = if state.is_terminal() {
            DroneEventKind::Released
        } else {
            DroneEventKind::Progress
        };
        self.drone_event(state, kind, snapshot.timestamp);

        let mut patch = MissionPatch::from_snapshot(snapshot);
        patch.completed_at = state.completed_at;
        let status_changed = self.last_status != Some(state.status);
        self.last_status = Some(state.status);
        self.checkpoint(&state.id, &patch, status_changed || state.is_terminal())
            .await;
    }

    /// Best-effort store write. Routine writes are skipped while backing off.
    async fn checkpoint(&mut self, mission_id: &str, patch: &MissionPatch, force: bool) {
        if !force && !self.backoff.should_attempt() {
            return;
        }
        match self.store.update(mission_id, patch).await {
            Ok(()) => self.backoff.record_success(),
            Err(err) => {
                let delay = self.backoff.record_failure();
                tracing::warn!(
                    "Checkpoint for mission {} failed ({} in a row): {} (backing off {:?})",
                    mission_id,
                    self.backoff.failures(),
                    err,
                    delay
                );
            }
        }
    }

    fn drone_event(&self, state: &MissionState, kind: DroneEventKind, timestamp: DateTime<Utc>) {
        let event = DroneEvent {
            drone_id: state.drone_id.clone(),
            mission_id: state.id.clone(),
            kind,
            location: state.position,
            battery_percent: state.battery_percent,
            timestamp,
        };
        // Fleet tracking is optional; no receivers is not an error.
        let _ = self.fleet_tx.send(event);
    }
}
