use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{CheckStage, Occupancy};
use crate::error::SpotError;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Snoozed,
}

/// Result of one `check` call that reached a decision.
///
/// `state` in `Skipped` and `Failed` is the spot's unchanged state, so the
/// dashboard can keep showing it next to the failure.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Completed {
        state: Occupancy,
        previous_state: Occupancy,
        checked_at: DateTime<Utc>,
        confidence: Option<f64>,
        explanation: Option<String>,
    },
    Skipped {
        reason: SkipReason,
        state: Occupancy,
        snoozed_until: Option<DateTime<Utc>>,
    },
    Failed {
        stage: CheckStage,
        error: String,
        state: Occupancy,
    },
}

impl CheckOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            CheckOutcome::Completed { .. } => "completed",
            CheckOutcome::Skipped { .. } => "skipped",
            CheckOutcome::Failed { .. } => "failed",
        }
    }
}

/// One spot's entry in a `check_all` pass.
#[derive(Debug)]
pub struct SpotCheckResult {
    pub spot_id: String,
    pub outcome: Result<CheckOutcome, SpotError>,
}

/// Per-status counts for a `check_all` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rejected: usize,
}

impl PassSummary {
    pub fn from_results(results: &[SpotCheckResult]) -> Self {
        results
            .iter()
            .fold(Self::default(), |mut summary, result| {
                match &result.outcome {
                    Ok(CheckOutcome::Completed { .. }) => summary.completed += 1,
                    Ok(CheckOutcome::Skipped { .. }) => summary.skipped += 1,
                    Ok(CheckOutcome::Failed { .. }) => summary.failed += 1,
                    Err(_) => summary.rejected += 1,
                }
                summary
            })
    }
}
