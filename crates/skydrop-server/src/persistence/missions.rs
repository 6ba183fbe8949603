//! Mission persistence operations.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use skydrop_core::{Coordinate, MissionPatch, MissionPhase, MissionRecord, MissionStatus};

use super::{Database, MissionStore};

const SELECT_COLUMNS: &str = "SELECT id, drone_id, name, route, current_step, status, phase, battery_percent, altitude_m, lat, lon, eta_s, started_at, completed_at FROM missions";

/// SQLite-backed [`MissionStore`].
#[derive(Clone)]
pub struct SqliteMissionStore {
    db: Database,
}

impl SqliteMissionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MissionStore for SqliteMissionStore {
    async fn create(&self, mission: &MissionRecord) -> Result<()> {
        let route = serde_json::to_string(&mission.route)?;
        sqlx::query(
            r#"
            INSERT INTO missions (id, drone_id, name, route, current_step, status, phase, battery_percent, altitude_m, lat, lon, eta_s, started_at, completed_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(id) DO UPDATE SET
                drone_id = ?2, name = ?3, route = ?4,
                current_step = ?5, status = ?6, phase = ?7,
                battery_percent = ?8, altitude_m = ?9,
                lat = ?10, lon = ?11, eta_s = ?12,
                started_at = ?13, completed_at = ?14, updated_at = ?15
            "#,
        )
        .bind(&mission.id)
        .bind(&mission.drone_id)
        .bind(&mission.name)
        .bind(route)
        .bind(mission.current_step as i64)
        .bind(mission.status.as_str())
        .bind(mission.phase.map(|p| p.as_str()))
        .bind(mission.battery_percent)
        .bind(mission.altitude_m)
        .bind(mission.position.map(|p| p.lat))
        .bind(mission.position.map(|p| p.lon))
        .bind(mission.eta_s)
        .bind(mission.started_at.map(|t| t.to_rfc3339()))
        .bind(mission.completed_at.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn update(&self, id: &str, patch: &MissionPatch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO missions (id, current_step, status, phase, battery_percent, altitude_m, lat, lon, eta_s, started_at, completed_at, updated_at)
            VALUES (?1, COALESCE(?2, 0), COALESCE(?3, 'idle'), ?4, COALESCE(?5, 100), COALESCE(?6, 0), ?7, ?8, COALESCE(?9, 0), ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                current_step = COALESCE(?2, current_step),
                status = COALESCE(?3, status),
                phase = COALESCE(?4, phase),
                battery_percent = COALESCE(?5, battery_percent),
                altitude_m = COALESCE(?6, altitude_m),
                lat = COALESCE(?7, lat),
                lon = COALESCE(?8, lon),
                eta_s = COALESCE(?9, eta_s),
                started_at = COALESCE(?10, started_at),
                completed_at = COALESCE(?11, completed_at),
                updated_at = ?12
            "#,
        )
        .bind(id)
        .bind(patch.current_step.map(|s| s as i64))
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.phase.map(|p| p.as_str()))
        .bind(patch.battery_percent)
        .bind(patch.altitude_m)
        .bind(patch.position.map(|p| p.lat))
        .bind(patch.position.map(|p| p.lon))
        .bind(patch.eta_s)
        .bind(patch.started_at.map(|t| t.to_rfc3339()))
        .bind(patch.completed_at.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MissionRecord>> {
        let row = sqlx::query_as::<_, MissionRow>(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(Into::into))
    }

    async fn list_all(&self) -> Result<Vec<MissionRecord>> {
        let rows = sqlx::query_as::<_, MissionRow>(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// Internal row type for SQLx
#[derive(sqlx::FromRow)]
struct MissionRow {
    id: String,
    drone_id: Option<String>,
    name: Option<String>,
    route: String,
    current_step: i64,
    status: String,
    phase: Option<String>,
    battery_percent: f64,
    altitude_m: f64,
    lat: Option<f64>,
    lon: Option<f64>,
    eta_s: f64,
    started_at: Option<String>,
    completed_at: Option<String>,
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl From<MissionRow> for MissionRecord {
    fn from(row: MissionRow) -> Self {
        let route: Vec<Coordinate> = serde_json::from_str(&row.route).unwrap_or_else(|err| {
            tracing::warn!("Mission {} has an unreadable route: {}", row.id, err);
            Vec::new()
        });
        let position = match (row.lat, row.lon) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
            _ => None,
        };

        MissionRecord {
            status: MissionStatus::parse(&row.status).unwrap_or_default(),
            phase: row.phase.as_deref().and_then(MissionPhase::parse),
            current_step: row.current_step.max(0) as usize,
            drone_id: row.drone_id,
            name: row.name,
            route,
            battery_percent: row.battery_percent,
            altitude_m: row.altitude_m,
            position,
            eta_s: row.eta_s,
            started_at: parse_timestamp(row.started_at),
            completed_at: parse_timestamp(row.completed_at),
            id: row.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;

    async fn store() -> SqliteMissionStore {
        SqliteMissionStore::new(init_database(":memory:", 1).await.unwrap())
    }

    fn record() -> MissionRecord {
        MissionRecord {
            id: "m1".into(),
            drone_id: Some("drone_001".into()),
            name: Some("Pharmacy run".into()),
            route: vec![Coordinate::new(52.52, 13.405), Coordinate::new(52.524, 13.409)],
            current_step: 0,
            status: MissionStatus::TakingOff,
            phase: Some(MissionPhase::Takeoff),
            battery_percent: 100.0,
            altitude_m: 0.0,
            position: Some(Coordinate::new(52.52, 13.405)),
            eta_s: 90.0,
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = store().await;
        let record = record();
        store.create(&record).await.unwrap();

        let loaded = store.get("m1").await.unwrap().unwrap();
        assert_eq!(loaded.route, record.route);
        assert_eq!(loaded.name, record.name);
        assert_eq!(loaded.phase, Some(MissionPhase::Takeoff));
        assert_eq!(loaded.position, record.position);
        assert!(loaded.started_at.is_some());
    }

    #[tokio::test]
    async fn partial_update_keeps_other_columns() {
        let store = store().await;
        store.create(&record()).await.unwrap();

        store
            .update("m1", &MissionPatch::status(MissionStatus::Paused))
            .await
            .unwrap();

        let loaded = store.get("m1").await.unwrap().unwrap();
        assert_eq!(loaded.status, MissionStatus::Paused);
        assert_eq!(loaded.eta_s, 90.0);
        assert_eq!(loaded.drone_id.as_deref(), Some("drone_001"));
        assert_eq!(loaded.route.len(), 2);
        assert_eq!(loaded.phase, Some(MissionPhase::Takeoff));
    }

    #[tokio::test]
    async fn update_is_an_upsert() {
        let store = store().await;
        let patch = MissionPatch {
            battery_percent: Some(42.0),
            ..MissionPatch::status(MissionStatus::InProgress)
        };
        store.update("late", &patch).await.unwrap();
        store.update("late", &patch).await.unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].battery_percent, 42.0);
        assert_eq!(all[0].status, MissionStatus::InProgress);
        assert!(all[0].route.is_empty());
    }
}
