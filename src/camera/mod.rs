//! Image source adapter: resolves a spot's `image_source_ref` to a snapshot.

mod home_assistant;
mod snapshot;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

pub use home_assistant::HomeAssistantCamera;
pub use snapshot::{inspect_snapshot, Snapshot, MIN_SNAPSHOT_BYTES};

/// A camera entity that can back a spot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Camera {
    pub entity_id: String,
    pub name: String,
    pub state: String,
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Most recent snapshot for `source_ref`, as raw encoded image bytes.
    async fn fetch(&self, source_ref: &str) -> Result<Vec<u8>, AdapterError>;

    /// Cameras this source can serve. Sources without discovery return none.
    async fn list_cameras(&self) -> Result<Vec<Camera>, AdapterError> {
        Ok(Vec::new())
    }
}
