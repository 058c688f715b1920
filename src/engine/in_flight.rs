use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::error::{Result, SpotError};

/// Spots with a check currently running.
///
/// A second check for a busy spot is rejected rather than queued, so one
/// trigger never produces two classifier calls for the same spot.
#[derive(Clone, Default)]
pub struct InFlightChecks {
    busy: Arc<Mutex<HashSet<String>>>,
}

/// Marks a spot busy until dropped.
pub struct InFlightGuard {
    busy: Arc<Mutex<HashSet<String>>>,
    spot_id: String,
}

fn lock(busy: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    match busy.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl InFlightChecks {
    pub fn try_acquire(&self, spot_id: &str) -> Result<InFlightGuard> {
        if !lock(&self.busy).insert(spot_id.to_string()) {
            return Err(SpotError::InProgress(spot_id.to_string()));
        }
        Ok(InFlightGuard {
            busy: Arc::clone(&self.busy),
            spot_id: spot_id.to_string(),
        })
    }

    pub fn is_busy(&self, spot_id: &str) -> bool {
        lock(&self.busy).contains(spot_id)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.busy).remove(&self.spot_id);
    }
}
