//! Check history data model.
//!
//! One record per completed check attempt, successful or not. Records are
//! append-only and owned by exactly one spot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Occupancy;

/// The adapter stage a failed check stopped at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStage {
    ImageFetch,
    Classification,
}

impl CheckStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStage::ImageFetch => "image_fetch",
            CheckStage::Classification => "classification",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckRecord {
    pub id: Option<i64>,
    pub spot_id: String,
    pub timestamp: DateTime<Utc>,
    pub result: Occupancy,
    pub confidence: Option<f64>,
    pub explanation: Option<String>,
    pub raw_classifier_output: Option<String>,
    pub error: Option<String>,
    pub error_stage: Option<CheckStage>,
}

impl CheckRecord {
    /// Record for a classification that came back.
    pub fn success(
        spot_id: &str,
        timestamp: DateTime<Utc>,
        result: Occupancy,
        confidence: Option<f64>,
        explanation: Option<String>,
        raw_classifier_output: String,
    ) -> Self {
        Self {
            id: None,
            spot_id: spot_id.to_string(),
            timestamp,
            result,
            confidence,
            explanation,
            raw_classifier_output: Some(raw_classifier_output),
            error: None,
            error_stage: None,
        }
    }

    /// Record for an attempt that stopped at `stage`.
    pub fn failure(
        spot_id: &str,
        timestamp: DateTime<Utc>,
        stage: CheckStage,
        error: String,
    ) -> Self {
        Self {
            id: None,
            spot_id: spot_id.to_string(),
            timestamp,
            result: Occupancy::Unknown,
            confidence: None,
            explanation: None,
            raw_classifier_output: None,
            error: Some(error),
            error_stage: Some(stage),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}
