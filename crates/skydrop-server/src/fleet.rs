//! Drone fleet inventory.
//!
//! Missions never touch drone records directly. Runners publish
//! [`DroneEvent`]s and [`run_fleet_loop`] folds them into the registry.

use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use skydrop_core::{Coordinate, Drone, DroneCapabilities, DroneEvent, DroneEventKind, DroneStatus};

/// Drones below this charge are not offered for new missions.
pub const MIN_DISPATCH_BATTERY_PERCENT: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FleetError {
    #[error("drone {0} is already registered")]
    AlreadyRegistered(String),
    #[error("drone {0} not found")]
    NotFound(String),
}

#[derive(Debug, Default)]
pub struct FleetRegistry {
    drones: DashMap<String, Drone>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two demo drones parked in central Berlin.
    pub fn with_sample_fleet() -> Self {
        let fleet = Self::new();
        for drone in [
            Drone {
                drone_id: "drone_001".to_string(),
                status: DroneStatus::Idle,
                battery_percent: 96.0,
                location: Coordinate::new(52.52, 13.405),
                capabilities: DroneCapabilities {
                    payload_kg: 0.5,
                    range_km: 10.0,
                },
            },
            Drone {
                drone_id: "drone_002".to_string(),
                status: DroneStatus::Charging,
                battery_percent: 40.0,
                location: Coordinate::new(52.53, 13.41),
                capabilities: DroneCapabilities {
                    payload_kg: 1.0,
                    range_km: 15.0,
                },
            },
        ] {
            fleet.drones.insert(drone.drone_id.clone(), drone);
        }
        fleet
    }

    pub fn register(&self, drone: Drone) -> Result<Drone, FleetError> {
        match self.drones.entry(drone.drone_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(FleetError::AlreadyRegistered(drone.drone_id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(drone.clone());
                tracing::info!("Registered drone {}", drone.drone_id);
                Ok(drone)
            }
        }
    }

    pub fn get(&self, drone_id: &str) -> Option<Drone> {
        self.drones.get(drone_id).map(|d| d.value().clone())
    }

    /// All drones, sorted by id.
    pub fn list(&self) -> Vec<Drone> {
        let mut drones: Vec<Drone> = self.drones.iter().map(|d| d.value().clone()).collect();
        drones.sort_by(|a, b| a.drone_id.cmp(&b.drone_id));
        drones
    }

    /// Idle drones with enough charge to take a mission.
    pub fn available(&self) -> Vec<Drone> {
        self.list().into_iter().filter(is_dispatchable).collect()
    }

    /// Reserve the first available drone that can carry `payload_kg`.
    pub fn assign(&self, payload_kg: f64) -> Option<Drone> {
        for candidate in self.available() {
            if candidate.capabilities.payload_kg < payload_kg {
                continue;
            }
            if let Some(mut drone) = self.drones.get_mut(&candidate.drone_id) {
                // re-check under the lock; another request may have taken it
                if !is_dispatchable(&drone) {
                    continue;
                }
                drone.status = DroneStatus::InMission;
                return Some(drone.value().clone());
            }
        }
        None
    }

    /// Return a reserved drone to the idle pool.
    pub fn release(&self, drone_id: &str) -> Result<(), FleetError> {
        let mut drone = self
            .drones
            .get_mut(drone_id)
            .ok_or_else(|| FleetError::NotFound(drone_id.to_string()))?;
        drone.status = DroneStatus::Idle;
        Ok(())
    }

    /// Fold a mission event into the drone's record. Unknown drones are ignored.
    pub fn apply_event(&self, event: &DroneEvent) {
        let Some(mut drone) = self.drones.get_mut(&event.drone_id) else {
            tracing::debug!("Event for unregistered drone {}", event.drone_id);
            return;
        };
        drone.location = event.location;
        drone.battery_percent = event.battery_percent;
        drone.status = match event.kind {
            DroneEventKind::Dispatched | DroneEventKind::Progress => DroneStatus::InMission,
            DroneEventKind::Released => DroneStatus::Idle,
        };
    }
}

fn is_dispatchable(drone: &Drone) -> bool {
    drone.status == DroneStatus::Idle && drone.battery_percent > MIN_DISPATCH_BATTERY_PERCENT
}

/// Apply drone events from running missions until shutdown.
pub async fn run_fleet_loop(
    fleet: Arc<FleetRegistry>,
    mut events: broadcast::Receiver<DroneEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Fleet loop shutting down");
                break;
            }
            event = events.recv() => {
                match event {
                    Ok(event) => fleet.apply_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Progress events supersede each other; a newer one follows.
                        tracing::debug!("Fleet loop skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}
