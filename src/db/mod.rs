mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{CheckRecord, CheckStage, NewSpot, Occupancy, Spot, SpotPatch};
