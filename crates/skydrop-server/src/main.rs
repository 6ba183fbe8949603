//! SkyDrop Server - mission simulation backend

use anyhow::{bail, Result};
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skydrop_server::api;
use skydrop_server::config::Config;
use skydrop_server::fleet::run_fleet_loop;
use skydrop_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    init_tracing(config.log_json)?;

    tracing::info!("Starting SkyDrop Server...");

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            tracing::error!("Invalid configuration: {}", problem);
        }
        bail!("{} configuration problem(s)", problems.len());
    }

    let port = config.server_port;
    let state = Arc::new(AppState::from_config(config).await?);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let fleet_task = tokio::spawn(run_fleet_loop(
        state.fleet.clone(),
        state.coordinator.fleet_events(),
        shutdown_tx.subscribe(),
    ));

    let app = api::routes()
        .route("/health", get(|| async { "OK" }))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, aborting active missions");
    state.coordinator.shutdown().await;
    let _ = shutdown_tx.send(());
    if let Err(err) = fleet_task.await {
        tracing::warn!("Fleet loop ended abnormally: {}", err);
    }

    Ok(())
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("skydrop_server=debug".parse()?);
    if json {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        // Without a signal handler, keep serving until the process is killed.
        std::future::pending::<()>().await;
    }
}
