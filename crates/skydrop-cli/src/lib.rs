//! SkyDrop CLI - operator tooling for the mission simulator.
//!
//! - `route`: parse waypoint lists from the command line
//! - `client`: thin async client for the server's REST API

pub mod client;
pub mod route;

pub use client::SkydropClient;
pub use route::{demo_route, parse_route};
