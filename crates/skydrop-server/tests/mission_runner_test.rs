//! Mission runner integration tests.
//!
//! Runs the coordinator against in-process collaborators on tokio's paused
//! clock, so a full mission completes in milliseconds of real time.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::{mpsc, watch};

use skydrop_core::{
    Coordinate, DroneEventKind, FlightProfile, MissionPatch, MissionPhase, MissionRecord,
    MissionState, MissionStatus, PhaseController, Route, TelemetrySnapshot, TerrainSample,
    WeatherReport,
};
use skydrop_server::coordinator::{MissionCoordinator, StartMission};
use skydrop_server::error::{ControlError, StartError};
use skydrop_server::persistence::{InMemoryMissionStore, MissionStore};
use skydrop_server::providers::{StaticWeather, TerrainProvider, TerrainTable, WeatherProvider};
use skydrop_server::runner::{Collaborators, MissionRunner, RunnerSettings};
use skydrop_server::telemetry::{TelemetryEmitter, TelemetryHub};

/// In-memory store that remembers the status of every checkpoint.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryMissionStore,
    statuses: Mutex<Vec<MissionStatus>>,
}

impl RecordingStore {
    fn count(&self, status: MissionStatus) -> usize {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|s| **s == status)
            .count()
    }
}

#[async_trait]
impl MissionStore for RecordingStore {
    async fn create(&self, mission: &MissionRecord) -> Result<()> {
        self.inner.create(mission).await
    }

    async fn update(&self, id: &str, patch: &MissionPatch) -> Result<()> {
        if let Some(status) = patch.status {
            self.statuses.lock().unwrap().push(status);
        }
        self.inner.update(id, patch).await
    }

    async fn get(&self, id: &str) -> Result<Option<MissionRecord>> {
        self.inner.get(id).await
    }

    async fn list_all(&self) -> Result<Vec<MissionRecord>> {
        self.inner.list_all().await
    }
}

/// Answers the pre-flight check, then fails every lookup.
struct FlakyWeather {
    calls: AtomicUsize,
    report: WeatherReport,
}

#[async_trait]
impl WeatherProvider for FlakyWeather {
    async fn check(&self, _lat: f64, _lon: f64) -> Result<WeatherReport> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(self.report.clone())
        } else {
            anyhow::bail!("weather service timed out")
        }
    }
}

struct BrokenTerrain;

#[async_trait]
impl TerrainProvider for BrokenTerrain {
    async fn lookup(&self, _lat: f64, _lon: f64) -> Result<Option<TerrainSample>> {
        anyhow::bail!("elevation tiles missing")
    }
}

struct Harness {
    coordinator: MissionCoordinator,
    store: Arc<RecordingStore>,
}

fn harness_with(
    weather: Arc<dyn WeatherProvider>,
    terrain: Arc<dyn TerrainProvider>,
) -> Harness {
    let store = Arc::new(RecordingStore::default());
    let collaborators = Collaborators {
        store: store.clone(),
        weather,
        terrain,
    };
    let (fleet_tx, _) = broadcast::channel(64);
    let coordinator = MissionCoordinator::new(
        collaborators,
        Arc::new(TelemetryHub::new(256)),
        fleet_tx,
        FlightProfile::default(),
        RunnerSettings::default(),
    );
    Harness { coordinator, store }
}

fn harness() -> Harness {
    harness_with(
        Arc::new(StaticWeather::new(WeatherReport::calm())),
        Arc::new(TerrainTable::new(Vec::new(), 5_000.0)),
    )
}

/// Roughly 2 km due north.
fn route() -> Vec<Coordinate> {
    vec![Coordinate::new(52.52, 13.405), Coordinate::new(52.538, 13.405)]
}

fn request(id: &str, route: Vec<Coordinate>) -> StartMission {
    StartMission {
        mission_id: Some(id.to_string()),
        drone_id: "drone_001".to_string(),
        route,
        name: None,
    }
}

async fn next_snapshot(rx: &mut broadcast::Receiver<TelemetrySnapshot>) -> Option<TelemetrySnapshot> {
    loop {
        match rx.recv().await {
            Ok(snapshot) => return Some(snapshot),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return None,
        }
    }
}

async fn wait_for_phase(
    rx: &mut broadcast::Receiver<TelemetrySnapshot>,
    phase: MissionPhase,
) -> TelemetrySnapshot {
    loop {
        let snapshot = next_snapshot(rx).await.expect("stream ended early");
        if snapshot.phase == phase {
            return snapshot;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn mission_flies_full_profile_and_retires() {
    let h = harness();
    let mut rx = h.coordinator.subscribe("m-full");
    h.coordinator.start(request("m-full", route())).await.unwrap();

    let mut phases: Vec<MissionPhase> = Vec::new();
    let mut last = None;
    let mut last_battery = 100.0;
    while let Some(snapshot) = next_snapshot(&mut rx).await {
        assert!(snapshot.battery_percent <= last_battery);
        last_battery = snapshot.battery_percent;
        if phases.last() != Some(&snapshot.phase) {
            phases.push(snapshot.phase);
        }
        last = Some(snapshot);
    }

    assert_eq!(
        phases,
        vec![
            MissionPhase::Takeoff,
            MissionPhase::Cruise,
            MissionPhase::Delivery,
            MissionPhase::Returning,
            MissionPhase::Landing,
        ]
    );
    let last = last.unwrap();
    assert_eq!(last.status, MissionStatus::Completed);
    assert!(last.battery_percent < 100.0);

    assert!(!h.coordinator.is_active("m-full"));
    assert_eq!(h.coordinator.status("m-full"), Some(MissionStatus::Completed));
    let record = h.store.get("m-full").await.unwrap().unwrap();
    assert_eq!(record.status, MissionStatus::Completed);
    assert!(record.completed_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn pause_is_idempotent_and_freezes_the_mission() {
    let h = harness();
    let mut rx = h.coordinator.subscribe("m-pause");
    h.coordinator.start(request("m-pause", route())).await.unwrap();
    let before = wait_for_phase(&mut rx, MissionPhase::Cruise).await;

    assert_eq!(h.coordinator.pause("m-pause").await, Ok(MissionStatus::Paused));
    assert_eq!(h.coordinator.pause("m-pause").await, Ok(MissionStatus::Paused));
    assert_eq!(h.store.count(MissionStatus::Paused), 1);

    let paused = next_snapshot(&mut rx).await.unwrap();
    assert_eq!(paused.status, MissionStatus::Paused);

    tokio::time::sleep(Duration::from_secs(30)).await;
    let frozen = h.coordinator.latest_snapshot("m-pause").unwrap();
    assert_eq!(frozen.battery_percent, before.battery_percent);
    assert_eq!(frozen.position, before.position);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    assert_eq!(
        h.coordinator.resume("m-pause").await,
        Ok(MissionStatus::InProgress)
    );
    let resumed = next_snapshot(&mut rx).await.unwrap();
    assert_eq!(resumed.status, MissionStatus::InProgress);
    let moving = next_snapshot(&mut rx).await.unwrap();
    assert!(moving.battery_percent < before.battery_percent);

    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cancel_in_cruise_turns_back_on_next_tick() {
    let h = harness();
    let mut rx = h.coordinator.subscribe("m-cancel");
    h.coordinator.start(request("m-cancel", route())).await.unwrap();
    wait_for_phase(&mut rx, MissionPhase::Cruise).await;
    for _ in 0..5 {
        let snapshot = next_snapshot(&mut rx).await.unwrap();
        assert_eq!(snapshot.phase, MissionPhase::Cruise);
    }

    assert_eq!(
        h.coordinator.cancel("m-cancel").await,
        Ok(MissionStatus::InProgress)
    );
    let turned = next_snapshot(&mut rx).await.unwrap();
    assert_eq!(turned.phase, MissionPhase::Returning);
    assert_eq!(turned.status, MissionStatus::Cancelled);
    assert_eq!(turned.current_step, 0);

    let mut last = turned;
    while let Some(snapshot) = next_snapshot(&mut rx).await {
        last = snapshot;
    }
    assert_eq!(last.status, MissionStatus::Completed);
    assert!(last.position.lat < 52.53);
}

#[tokio::test(start_paused = true)]
async fn abort_stops_the_mission_in_place() {
    let h = harness();
    let mut rx = h.coordinator.subscribe("m-abort");
    h.coordinator.start(request("m-abort", route())).await.unwrap();
    wait_for_phase(&mut rx, MissionPhase::Cruise).await;

    assert_eq!(h.coordinator.abort("m-abort").await, Ok(MissionStatus::Aborted));
    let aborted = next_snapshot(&mut rx).await.unwrap();
    assert_eq!(aborted.status, MissionStatus::Aborted);
    assert_eq!(aborted.phase, MissionPhase::Cruise);
    assert!(next_snapshot(&mut rx).await.is_none());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.coordinator.abort("m-abort").await, Ok(MissionStatus::Aborted));
    assert_eq!(
        h.coordinator.pause("m-abort").await,
        Err(ControlError::NotActive {
            status: MissionStatus::Aborted
        })
    );
    let record = h.store.get("m-abort").await.unwrap().unwrap();
    assert_eq!(record.status, MissionStatus::Aborted);
    assert_eq!(record.phase, Some(MissionPhase::Cruise));
}

#[tokio::test(start_paused = true)]
async fn single_waypoint_route_is_rejected() {
    let h = harness();
    let err = h
        .coordinator
        .start(request("m-short", vec![Coordinate::new(52.52, 13.405)]))
        .await
        .unwrap_err();
    assert!(matches!(err, StartError::Validation(_)));
    assert!(h.coordinator.active_missions().is_empty());
    assert!(h.store.list_all().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unsafe_weather_blocks_launch() {
    let storm = WeatherReport {
        wind_speed_mps: 4.0,
        wind_direction_deg: 180.0,
        visibility_m: 2000.0,
        is_safe: false,
        reason: "Thunderstorm reported".to_string(),
    };
    let h = harness_with(
        Arc::new(StaticWeather::new(storm)),
        Arc::new(TerrainTable::berlin_sample()),
    );
    let mut rx = h.coordinator.subscribe("m-storm");

    let err = h.coordinator.start(request("m-storm", route())).await.unwrap_err();
    assert_eq!(
        err,
        StartError::UnsafeWeather {
            reason: "Thunderstorm reported".to_string()
        }
    );
    assert!(!h.coordinator.is_active("m-storm"));
    // the refused mission's stream is closed rather than left dangling
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));
    assert!(h.coordinator.watch("m-storm").is_none());
}

#[tokio::test(start_paused = true)]
async fn duplicate_mission_id_is_refused_while_active() {
    let h = harness();
    h.coordinator.start(request("m-dup", route())).await.unwrap();
    assert_eq!(
        h.coordinator.start(request("m-dup", route())).await,
        Err(StartError::AlreadyActive("m-dup".to_string()))
    );
    assert_eq!(h.coordinator.active_missions(), vec!["m-dup".to_string()]);
    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn collaborator_failures_fall_back_to_last_known() {
    let report = WeatherReport {
        wind_speed_mps: 3.0,
        wind_direction_deg: 90.0,
        visibility_m: 9000.0,
        is_safe: true,
        reason: String::new(),
    };
    let h = harness_with(
        Arc::new(FlakyWeather {
            calls: AtomicUsize::new(0),
            report,
        }),
        Arc::new(BrokenTerrain),
    );
    let mut rx = h.coordinator.subscribe("m-flaky");
    h.coordinator.start(request("m-flaky", route())).await.unwrap();

    // launch snapshot, then the first tick
    next_snapshot(&mut rx).await.unwrap();
    let ticked = next_snapshot(&mut rx).await.unwrap();
    assert!(ticked.weather_stale);
    assert!(!ticked.terrain_available);
    assert_eq!(ticked.wind_speed_mps, 3.0);
    assert_eq!(ticked.wind_direction_deg, 90.0);
    assert!(ticked.altitude_m > 0.0);

    let cruising = wait_for_phase(&mut rx, MissionPhase::Cruise).await;
    assert_eq!(cruising.status, MissionStatus::InProgress);
    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn commands_for_unknown_missions_are_not_found() {
    let h = harness();
    assert_eq!(
        h.coordinator.resume("ghost").await,
        Err(ControlError::NotFound("ghost".to_string()))
    );
    assert_eq!(
        h.coordinator.abort("ghost").await,
        Err(ControlError::NotFound("ghost".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn route_exhaustion_fails_and_retires_the_runner() {
    let store = Arc::new(RecordingStore::default());
    let hub = Arc::new(TelemetryHub::new(64));
    let (fleet_tx, mut fleet_rx) = broadcast::channel(16);
    let collaborators = Collaborators {
        store: store.clone(),
        weather: Arc::new(StaticWeather::new(WeatherReport::calm())),
        terrain: Arc::new(TerrainTable::new(Vec::new(), 5_000.0)),
    };

    // cruising on a leg the route doesn't have
    let mut state = MissionState::new(
        "m-broken",
        "drone_001",
        Route::new(route()).unwrap(),
        Utc::now(),
    );
    state.phase = MissionPhase::Cruise;
    state.status = MissionStatus::InProgress;
    state.current_step = 7;

    let (_command_tx, command_rx) = mpsc::channel(4);
    let (status_tx, status_rx) = watch::channel(state.status);
    let mut rx = hub.subscribe("m-broken");
    let runner = MissionRunner::new(
        state,
        PhaseController::new(FlightProfile::default()),
        RunnerSettings::default(),
        collaborators,
        TelemetryEmitter::new(hub.clone(), store.clone(), fleet_tx),
        command_rx,
        status_tx,
    );

    let final_state = runner.run().await;
    assert_eq!(final_state.status, MissionStatus::Failed);
    assert!(final_state.completed_at.is_some());
    assert_eq!(*status_rx.borrow(), MissionStatus::Failed);

    let mut snapshots = Vec::new();
    while let Ok(snapshot) = rx.try_recv() {
        snapshots.push(snapshot);
    }
    let last = snapshots.last().expect("no telemetry published");
    assert_eq!(last.status, MissionStatus::Failed);
    assert_eq!(last.eta_s, 0.0);
    assert_eq!(store.count(MissionStatus::Failed), 1);

    let mut released = false;
    while let Ok(event) = fleet_rx.try_recv() {
        released = event.kind == DroneEventKind::Released;
    }
    assert!(released);

    // the runner is done; retiring the mission ends its stream
    hub.close("m-broken");
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn mission_id_is_reusable_once_retired() {
    let h = harness();
    let mut first = h.coordinator.subscribe("m-again");
    h.coordinator.start(request("m-again", route())).await.unwrap();
    wait_for_phase(&mut first, MissionPhase::Cruise).await;
    h.coordinator.abort("m-again").await.unwrap();
    while next_snapshot(&mut first).await.is_some() {}
    while h.coordinator.is_active("m-again") {
        tokio::task::yield_now().await;
    }

    h.coordinator.start(request("m-again", route())).await.unwrap();
    let mut second = h.coordinator.watch("m-again").expect("restarted mission has a stream");
    let cruising = wait_for_phase(&mut second, MissionPhase::Cruise).await;
    assert_eq!(cruising.status, MissionStatus::InProgress);
    assert_eq!(h.coordinator.status("m-again"), Some(MissionStatus::InProgress));
    h.coordinator.shutdown().await;
}

#[test]
fn non_positive_time_step_is_rejected() {
    for dt in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let settings = RunnerSettings {
            sim_seconds_per_tick: dt,
            ..RunnerSettings::default()
        };
        assert_eq!(settings.validate().len(), 1, "dt = {dt}");
    }
    assert!(RunnerSettings::default().validate().is_empty());

    let stalled = RunnerSettings {
        tick_interval: Duration::ZERO,
        ..RunnerSettings::default()
    };
    assert_eq!(stalled.validate().len(), 1);
}
