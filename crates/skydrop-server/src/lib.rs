//! Mission simulation runtime: runners, telemetry fan-out, collaborators and the HTTP surface.

pub mod api;
pub mod backoff;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fleet;
pub mod persistence;
pub mod providers;
pub mod runner;
pub mod state;
pub mod telemetry;
