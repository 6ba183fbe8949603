//! Persistence layer for mission checkpoints.
//!
//! The runner owns a mission while it is active; stores only mirror it. Two
//! backends: a DashMap for tests and store-less deployments, and SQLite.

pub mod db;
pub mod memory;
pub mod missions;

pub use db::{init_database, Database};
pub use memory::InMemoryMissionStore;
pub use missions::SqliteMissionStore;

use anyhow::Result;
use async_trait::async_trait;

use skydrop_core::{MissionPatch, MissionRecord};

#[async_trait]
pub trait MissionStore: Send + Sync {
    /// Insert a mission, replacing any earlier record with the same id.
    async fn create(&self, mission: &MissionRecord) -> Result<()>;
    /// Merge the fields present in `patch`. Creates the record if missing.
    async fn update(&self, id: &str, patch: &MissionPatch) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<MissionRecord>>;
    async fn list_all(&self) -> Result<Vec<MissionRecord>>;
}
