use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::db::models::{CheckStage, Occupancy};

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_occupancy(value: &str) -> Result<Occupancy> {
    match value {
        "unknown" => Ok(Occupancy::Unknown),
        "occupied" => Ok(Occupancy::Occupied),
        "free" => Ok(Occupancy::Free),
        other => Err(anyhow!("unknown occupancy state {other}")),
    }
}

pub fn parse_optional_stage(value: Option<String>) -> Result<Option<CheckStage>> {
    match value.as_deref() {
        None => Ok(None),
        Some("image_fetch") => Ok(Some(CheckStage::ImageFetch)),
        Some("classification") => Ok(Some(CheckStage::Classification)),
        Some(other) => Err(anyhow!("unknown check stage {other}")),
    }
}
