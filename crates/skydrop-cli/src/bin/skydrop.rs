//! Operator CLI for the SkyDrop mission simulator.
//!
//! `simulate` flies a mission in-process and prints its telemetry; the other
//! subcommands drive a running server.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skydrop_cli::client::StartRequest;
use skydrop_cli::{demo_route, parse_route, SkydropClient};
use skydrop_core::{FlightProfile, TelemetrySnapshot};
use skydrop_server::coordinator::{MissionCoordinator, StartMission};
use skydrop_server::persistence::InMemoryMissionStore;
use skydrop_server::providers::{StaticWeather, TerrainTable};
use skydrop_server::runner::{Collaborators, RunnerSettings};
use skydrop_server::telemetry::TelemetryHub;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// SkyDrop server URL
    #[arg(long, global = true, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fly a mission locally and print each telemetry snapshot
    Simulate {
        /// Waypoints as "lat,lon;lat,lon;..." (default: central Berlin)
        #[arg(long)]
        route: Option<String>,

        #[arg(long, default_value = "drone_001")]
        drone: String,

        /// Wall-clock milliseconds per tick
        #[arg(long, default_value_t = 100)]
        tick_ms: u64,

        /// Simulated seconds per tick
        #[arg(long, default_value_t = 1.0)]
        sim_seconds: f64,

        /// Cruise airspeed in m/s
        #[arg(long)]
        speed: Option<f64>,
    },
    /// Start a mission on the server
    Start {
        /// Waypoints as "lat,lon;lat,lon;..."
        #[arg(long)]
        route: String,

        /// Drone to fly; the server assigns one when omitted
        #[arg(long)]
        drone: Option<String>,

        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value_t = 0.0)]
        payload_kg: f64,
    },
    /// Send pause, resume, abort or cancel to a mission
    Control { mission_id: String, command: String },
    /// Show one mission, or all missions
    Status { mission_id: Option<String> },
    /// List the drone fleet
    Drones,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skydrop_server=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let client = SkydropClient::new(&args.url);

    match args.command {
        Command::Simulate {
            route,
            drone,
            tick_ms,
            sim_seconds,
            speed,
        } => {
            let route = match route {
                Some(route) => parse_route(&route)?,
                None => demo_route(),
            };
            let mut profile = FlightProfile::default();
            if let Some(speed) = speed {
                profile.cruise_speed_mps = speed;
            }
            let settings = RunnerSettings {
                tick_interval: Duration::from_millis(tick_ms.max(1)),
                sim_seconds_per_tick: sim_seconds,
            };
            let mut problems = profile.validate();
            problems.extend(settings.validate());
            if !problems.is_empty() {
                anyhow::bail!("Invalid simulation settings: {}", problems.join("; "));
            }
            simulate(route, drone, profile, settings).await?;
        }
        Command::Start {
            route,
            drone,
            id,
            name,
            payload_kg,
        } => {
            let request = StartRequest {
                mission_id: id,
                drone_id: drone,
                route: parse_route(&route)?,
                name,
                payload_kg,
            };
            let started = client.start_mission(&request).await?;
            println!("Mission {} started on {}", started.mission_id, started.drone_id);
            println!("Telemetry: {}", client.stream_url(&started.mission_id)?);
        }
        Command::Control {
            mission_id,
            command,
        } => {
            let reply = client.control(&mission_id, &command).await?;
            println!(
                "{} {}: status {}",
                mission_id,
                command,
                reply["status"].as_str().unwrap_or("unknown")
            );
        }
        Command::Status { mission_id } => {
            let body = match mission_id {
                Some(id) => client.mission(&id).await?,
                None => client.missions().await?,
            };
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Drones => {
            for drone in client.drones().await? {
                println!(
                    "{:<12} {:<12} {:>5.1}%  payload {:.1} kg  ({:.4}, {:.4})",
                    drone.drone_id,
                    format!("{:?}", drone.status),
                    drone.battery_percent,
                    drone.capabilities.payload_kg,
                    drone.location.lat,
                    drone.location.lon
                );
            }
        }
    }

    Ok(())
}

async fn simulate(
    route: Vec<skydrop_core::Coordinate>,
    drone_id: String,
    profile: FlightProfile,
    settings: RunnerSettings,
) -> Result<()> {
    let collaborators = Collaborators {
        store: Arc::new(InMemoryMissionStore::new()),
        weather: Arc::new(StaticWeather::nominal()),
        terrain: Arc::new(TerrainTable::berlin_sample()),
    };
    let (fleet_tx, _) = broadcast::channel(16);
    let coordinator = MissionCoordinator::new(
        collaborators,
        Arc::new(TelemetryHub::new(256)),
        fleet_tx,
        profile,
        settings,
    );

    let mission_id = "local".to_string();
    let mut rx = coordinator.subscribe(&mission_id);
    coordinator
        .start(StartMission {
            mission_id: Some(mission_id.clone()),
            drone_id,
            route,
            name: None,
        })
        .await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("\nAbort requested.");
                coordinator.abort(&mission_id).await?;
                ctrl_c.set(tokio::signal::ctrl_c());
            }
            snapshot = rx.recv() => match snapshot {
                Ok(snapshot) => print_snapshot(&snapshot),
                Err(RecvError::Lagged(skipped)) => println!("... {} snapshots skipped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    }

    if let Some(status) = coordinator.status(&mission_id) {
        println!("Mission finished: {}", status);
    }
    Ok(())
}

fn print_snapshot(s: &TelemetrySnapshot) {
    println!(
        "{} {:<9} {:<11} step {:>2}  ({:.5}, {:.5})  alt {:>6.1} m  bat {:>5.1}%  eta {:>6.0} s  wind {:.1} m/s @ {:.0}{}",
        s.timestamp.format("%H:%M:%S%.3f"),
        s.phase.as_str(),
        s.status.as_str(),
        s.current_step,
        s.position.lat,
        s.position.lon,
        s.altitude_m,
        s.battery_percent,
        s.eta_s,
        s.wind_speed_mps,
        s.wind_direction_deg,
        if s.weather_stale { " (stale)" } else { "" }
    );
}
