//! WebSocket streaming of a mission's telemetry.
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
};
use skydrop_core::TelemetrySnapshot;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

/// GET /v1/missions/:id/stream
pub async fn mission_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(mission_id): Path<String>,
) -> axum::response::Response {
    let Some(rx) = state.coordinator.watch(&mission_id) else {
        return (StatusCode::NOT_FOUND, "Mission is not running").into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, mission_id, rx))
        .into_response()
}

async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    mission_id: String,
    mut rx: broadcast::Receiver<TelemetrySnapshot>,
) {

    // Late joiners get the current picture before the next tick.
    if let Some(latest) = state.coordinator.latest_snapshot(&mission_id) {
        if let Ok(text) = serde_json::to_string(&latest) {
            if socket.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            snapshot = rx.recv() => {
                match snapshot {
                    Ok(snapshot) => {
                        let text = match serde_json::to_string(&snapshot) {
                            Ok(text) => text,
                            Err(err) => {
                                tracing::warn!("Failed to encode snapshot for {}: {}", mission_id, err);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(_)) => {
                        // Drop missed updates; a newer snapshot will arrive soon.
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }
}
