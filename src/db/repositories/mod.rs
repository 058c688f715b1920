mod check_records;
mod spots;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, SpotError};

fn spot_exists(conn: &Connection, spot_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM spots WHERE id = ?1",
        params![spot_id],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
}

/// Turns a "no such row" result from a store task into `NotFound`.
fn found<T>(value: Option<T>, spot_id: &str) -> Result<T> {
    value.ok_or_else(|| SpotError::NotFound(spot_id.to_string()))
}
