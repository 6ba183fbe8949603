use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use skydrop_core::{MissionPatch, MissionRecord};

use super::MissionStore;

#[derive(Debug, Default)]
pub struct InMemoryMissionStore {
    missions: DashMap<String, MissionRecord>,
}

impl InMemoryMissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MissionStore for InMemoryMissionStore {
    async fn create(&self, mission: &MissionRecord) -> Result<()> {
        self.missions.insert(mission.id.clone(), mission.clone());
        Ok(())
    }

    async fn update(&self, id: &str, patch: &MissionPatch) -> Result<()> {
        self.missions
            .entry(id.to_string())
            .or_insert_with(|| MissionRecord::empty(id))
            .apply(patch);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MissionRecord>> {
        Ok(self.missions.get(id).map(|r| r.value().clone()))
    }

    async fn list_all(&self) -> Result<Vec<MissionRecord>> {
        let mut missions: Vec<MissionRecord> =
            self.missions.iter().map(|r| r.value().clone()).collect();
        missions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(missions)
    }
}
