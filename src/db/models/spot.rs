//! Spot data models.
//!
//! A spot is a monitored location backed by one camera. Its `state` only ever
//! changes through a successful check or a reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized occupancy verdict for a spot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Occupancy {
    #[default]
    Unknown,
    Occupied,
    Free,
}

impl Occupancy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Occupancy::Unknown => "unknown",
            Occupancy::Occupied => "occupied",
            Occupancy::Free => "free",
        }
    }
}

impl std::fmt::Display for Occupancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Spot {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_source_ref: String,
    pub state: Occupancy,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub snoozed_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Spot {
    /// True while `now` is before `snoozed_until`.
    pub fn is_snoozed_at(&self, now: DateTime<Utc>) -> bool {
        self.snoozed_until.is_some_and(|until| now < until)
    }
}

/// Input for registering a spot. `id` is generated when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSpot {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub image_source_ref: String,
}

/// Partial update of a spot's descriptive fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_source_ref: Option<String>,
}

impl SpotPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.image_source_ref.is_none()
    }
}
