use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{
        format_datetime, parse_datetime, parse_occupancy, parse_optional_stage, to_i64,
    },
    models::{CheckRecord, Occupancy},
};
use crate::error::Result;

use super::{found, spot_exists};

fn row_to_record(row: &Row) -> anyhow::Result<CheckRecord> {
    let timestamp: String = row.get("timestamp")?;
    let result: String = row.get("result")?;

    Ok(CheckRecord {
        id: row.get("id")?,
        spot_id: row.get("spot_id")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        result: parse_occupancy(&result)?,
        confidence: row.get("confidence")?,
        explanation: row.get("explanation")?,
        raw_classifier_output: row.get("raw_classifier_output")?,
        error: row.get("error")?,
        error_stage: parse_optional_stage(row.get("error_stage")?)?,
    })
}

fn insert_record(conn: &Connection, record: &CheckRecord) -> anyhow::Result<CheckRecord> {
    conn.execute(
        "INSERT INTO check_records (
            spot_id,
            timestamp,
            result,
            confidence,
            explanation,
            raw_classifier_output,
            error,
            error_stage
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.spot_id,
            format_datetime(&record.timestamp),
            record.result.as_str(),
            record.confidence,
            record.explanation,
            record.raw_classifier_output,
            record.error,
            record.error_stage.map(|stage| stage.as_str()),
        ],
    )
    .with_context(|| "failed to insert check record")?;

    let mut stored = record.clone();
    stored.id = Some(conn.last_insert_rowid());
    Ok(stored)
}

impl Database {
    /// Append one record to a spot's history.
    pub async fn append_check_record(
        &self,
        spot_id: &str,
        record: &CheckRecord,
    ) -> Result<CheckRecord> {
        let mut record = record.clone();
        record.spot_id = spot_id.to_string();
        let stored = self
            .execute(move |conn| {
                if !spot_exists(conn, &record.spot_id)? {
                    return Ok(None);
                }
                insert_record(conn, &record).map(Some)
            })
            .await?;
        found(stored, spot_id)
    }

    /// Append a record and, when `new_state` is given, move the spot to it in
    /// the same transaction. `last_checked_at` takes the record's timestamp.
    pub async fn record_check(
        &self,
        spot_id: &str,
        record: &CheckRecord,
        new_state: Option<Occupancy>,
    ) -> Result<CheckRecord> {
        let mut record = record.clone();
        record.spot_id = spot_id.to_string();
        let stored = self
            .execute(move |conn| {
                let tx = conn.transaction()?;
                if !spot_exists(&tx, &record.spot_id)? {
                    return Ok(None);
                }

                let stored = insert_record(&tx, &record)?;
                if let Some(state) = new_state {
                    tx.execute(
                        "UPDATE spots
                         SET state = ?1,
                             last_checked_at = ?2,
                             updated_at = ?3
                         WHERE id = ?4",
                        params![
                            state.as_str(),
                            format_datetime(&record.timestamp),
                            format_datetime(&Utc::now()),
                            record.spot_id,
                        ],
                    )
                    .with_context(|| "failed to update spot state")?;
                }

                tx.commit().with_context(|| "failed to commit check")?;
                Ok(Some(stored))
            })
            .await?;
        found(stored, spot_id)
    }

    /// The newest `limit` records (all when `None`), oldest first.
    pub async fn list_history(
        &self,
        spot_id: &str,
        limit: Option<u64>,
    ) -> Result<Vec<CheckRecord>> {
        let id = spot_id.to_string();
        let history = self
            .execute(move |conn| {
                if !spot_exists(conn, &id)? {
                    return Ok(None);
                }

                let limit = match limit {
                    Some(limit) => to_i64(limit)?,
                    None => -1,
                };
                let mut stmt = conn.prepare(
                    "SELECT id, spot_id, timestamp, result, confidence, explanation,
                            raw_classifier_output, error, error_stage
                     FROM check_records
                     WHERE spot_id = ?1
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?2",
                )?;
                let mut rows = stmt.query(params![id, limit])?;
                let mut records = Vec::new();
                while let Some(row) = rows.next()? {
                    records.push(row_to_record(row)?);
                }
                records.reverse();
                Ok(Some(records))
            })
            .await?;
        found(history, spot_id)
    }

    pub async fn clear_history(&self, spot_id: &str) -> Result<()> {
        let id = spot_id.to_string();
        let cleared = self
            .execute(move |conn| {
                if !spot_exists(conn, &id)? {
                    return Ok(None);
                }
                conn.execute("DELETE FROM check_records WHERE spot_id = ?1", params![id])
                    .with_context(|| "failed to clear check history")?;
                Ok(Some(()))
            })
            .await?;
        found(cleared, spot_id)
    }
}
