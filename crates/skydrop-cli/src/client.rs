//! Client for the SkyDrop server REST API.

use anyhow::{Context, Result};
use reqwest::{Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use skydrop_core::{Coordinate, Drone};

#[derive(Debug, Serialize)]
pub struct StartRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mission_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drone_id: Option<String>,
    pub route: Vec<Coordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub payload_kg: f64,
}

#[derive(Debug, Deserialize)]
pub struct StartResponse {
    pub mission_id: String,
    pub drone_id: String,
}

/// Client for one SkyDrop server.
pub struct SkydropClient {
    base_url: String,
    client: reqwest::Client,
}

impl SkydropClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a mission and start it.
    pub async fn start_mission(&self, request: &StartRequest) -> Result<StartResponse> {
        let url = format!("{}/v1/missions", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .context("Failed to reach server")?;
        Ok(check(response).await?.json().await?)
    }

    /// Send `pause`, `resume`, `abort` or `cancel`. Returns the server's reply.
    pub async fn control(&self, mission_id: &str, command: &str) -> Result<Value> {
        let url = format!("{}/v1/missions/{}/{}", self.base_url, mission_id, command);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .context("Failed to reach server")?;
        Ok(check(response).await?.json().await?)
    }

    /// Stored record plus live telemetry for one mission.
    pub async fn mission(&self, mission_id: &str) -> Result<Value> {
        self.get_json(&format!("/v1/missions/{}", mission_id)).await
    }

    pub async fn missions(&self) -> Result<Value> {
        self.get_json("/v1/missions").await
    }

    pub async fn drones(&self) -> Result<Vec<Drone>> {
        let url = format!("{}/v1/drones", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach server")?;
        Ok(check(response).await?.json().await?)
    }

    /// WebSocket URL streaming a mission's telemetry.
    pub fn stream_url(&self, mission_id: &str) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/v1/missions/{}/stream",
            self.base_url, mission_id
        ))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("Cannot derive WebSocket URL from {}", self.base_url))?;
        Ok(url)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach server")?;
        Ok(check(response).await?.json().await?)
    }
}

/// Turn a non-2xx response into an error carrying the server's message.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = body["error"].as_str().unwrap_or("no details");
    anyhow::bail!("Server returned {}: {}", status, message)
}
