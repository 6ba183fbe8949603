use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use skydrop_core::WeatherReport;

use crate::{
    api,
    config::Config,
    fleet::FleetRegistry,
    persistence::InMemoryMissionStore,
    providers::{StaticWeather, TerrainTable, WeatherProvider},
    runner::Collaborators,
    state::AppState,
};

struct OfflineWeather;

#[async_trait]
impl WeatherProvider for OfflineWeather {
    async fn check(&self, _lat: f64, _lon: f64) -> Result<WeatherReport> {
        anyhow::bail!("connection refused")
    }
}

fn setup_app_with(weather: Arc<dyn WeatherProvider>) -> (axum::Router, Arc<AppState>) {
    let config = Config {
        // Keep runners idle between requests.
        tick_interval_ms: 3_600_000,
        ..Config::default()
    };
    let collaborators = Collaborators {
        store: Arc::new(InMemoryMissionStore::new()),
        weather,
        terrain: Arc::new(TerrainTable::berlin_sample()),
    };
    let state = Arc::new(AppState::new(
        config,
        collaborators,
        Arc::new(FleetRegistry::with_sample_fleet()),
    ));
    let app = api::routes().with_state(state.clone());
    (app, state)
}

fn setup_app() -> (axum::Router, Arc<AppState>) {
    setup_app_with(Arc::new(StaticWeather::nominal()))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

fn berlin_route() -> Value {
    json!([
        {"lat": 52.52, "lon": 13.405},
        {"lat": 52.525, "lon": 13.41},
        {"lat": 52.53, "lon": 13.42}
    ])
}

#[tokio::test]
async fn create_get_and_pause_mission() {
    let (app, state) = setup_app();

    let res = app
        .clone()
        .oneshot(post_json(
            "/v1/missions",
            json!({"mission_id": "m-api", "drone_id": "drone_001", "route": berlin_route()}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = read_json(res).await;
    assert_eq!(body["mission_id"], "m-api");
    assert!(state.coordinator.is_active("m-api"));

    let res = app.clone().oneshot(get("/v1/missions/m-api")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["id"], "m-api");
    assert_eq!(body["active"], true);
    assert_eq!(body["route"].as_array().unwrap().len(), 3);

    let res = app
        .clone()
        .oneshot(post_empty("/v1/missions/m-api/pause"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(read_json(res).await["status"], "paused");

    let res = app.clone().oneshot(get("/v1/missions")).await.unwrap();
    let body = read_json(res).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    state.coordinator.shutdown().await;
}

#[tokio::test]
async fn create_rejects_short_route() {
    let (app, state) = setup_app();
    let res = app
        .oneshot(post_json(
            "/v1/missions",
            json!({"drone_id": "drone_001", "route": [{"lat": 52.52, "lon": 13.405}]}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(state.coordinator.active_missions().is_empty());
}

#[tokio::test]
async fn create_maps_weather_failures() {
    let unsafe_weather = StaticWeather::new(WeatherReport {
        wind_speed_mps: 22.0,
        wind_direction_deg: 270.0,
        visibility_m: 6000.0,
        is_safe: false,
        reason: "High wind speed: 22.0 m/s".to_string(),
    });
    let (app, _) = setup_app_with(Arc::new(unsafe_weather));
    let res = app
        .oneshot(post_json(
            "/v1/missions",
            json!({"drone_id": "drone_001", "route": berlin_route()}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("High wind"));

    let (app, _) = setup_app_with(Arc::new(OfflineWeather));
    let res = app
        .oneshot(post_json(
            "/v1/missions",
            json!({"drone_id": "drone_001", "route": berlin_route()}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn duplicate_active_mission_conflicts() {
    let (app, state) = setup_app();
    let request = json!({"mission_id": "dup", "drone_id": "drone_001", "route": berlin_route()});

    let res = app.clone().oneshot(post_json("/v1/missions", request.clone())).await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = app.oneshot(post_json("/v1/missions", request)).await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    state.coordinator.shutdown().await;
}

#[tokio::test]
async fn create_without_drone_assigns_from_fleet() {
    let (app, state) = setup_app();
    let res = app
        .clone()
        .oneshot(post_json(
            "/v1/missions",
            json!({"route": berlin_route(), "payload_kg": 0.4}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(read_json(res).await["drone_id"], "drone_001");

    // drone_002 is charging, so nothing is left
    let res = app
        .oneshot(post_json(
            "/v1/missions",
            json!({"route": berlin_route(), "payload_kg": 0.4}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    state.coordinator.shutdown().await;
}

#[tokio::test]
async fn control_errors() {
    let (app, state) = setup_app();

    let res = app
        .clone()
        .oneshot(post_empty("/v1/missions/ghost/abort"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .clone()
        .oneshot(post_json(
            "/v1/missions",
            json!({"mission_id": "m-ctl", "drone_id": "drone_001", "route": berlin_route()}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = app
        .clone()
        .oneshot(post_empty("/v1/missions/m-ctl/explode"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(post_empty("/v1/missions/m-ctl/abort"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(read_json(res).await["status"], "aborted");

    state.coordinator.shutdown().await;
}

#[tokio::test]
async fn drone_registration_and_assignment() {
    let (app, _) = setup_app();
    let drone = json!({
        "drone_id": "drone_003",
        "battery_percent": 88.0,
        "location": {"lat": 52.51, "lon": 13.39},
        "capabilities": {"payload_kg": 2.0, "range_km": 12.0}
    });

    let res = app
        .clone()
        .oneshot(post_json("/v1/drones/register", drone.clone()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(read_json(res).await["status"], "idle");

    let res = app
        .clone()
        .oneshot(post_json("/v1/drones/register", drone))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app.clone().oneshot(get("/v1/drones/available")).await.unwrap();
    let available = read_json(res).await;
    assert_eq!(available.as_array().unwrap().len(), 2);

    let res = app
        .clone()
        .oneshot(post_json("/v1/drones/assign/m-heavy", json!({"payload_kg": 1.5})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["mission_id"], "m-heavy");
    assert_eq!(body["drone"]["drone_id"], "drone_003");
    assert_eq!(body["drone"]["status"], "in_mission");

    let res = app.oneshot(get("/v1/drones")).await.unwrap();
    assert_eq!(read_json(res).await.as_array().unwrap().len(), 3);
}
