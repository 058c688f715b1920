use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_occupancy, parse_optional_datetime},
    models::{NewSpot, Occupancy, Spot, SpotPatch},
};
use crate::error::{Result, SpotError};

use super::{found, spot_exists};

const SPOT_COLUMNS: &str = "id, name, description, image_source_ref, state, last_checked_at, snoozed_until, created_at, updated_at";

fn row_to_spot(row: &Row) -> anyhow::Result<Spot> {
    let state: String = row.get("state")?;
    let last_checked_at: Option<String> = row.get("last_checked_at")?;
    let snoozed_until: Option<String> = row.get("snoozed_until")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Spot {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        image_source_ref: row.get("image_source_ref")?,
        state: parse_occupancy(&state)?,
        last_checked_at: parse_optional_datetime(last_checked_at, "last_checked_at")?,
        snoozed_until: parse_optional_datetime(snoozed_until, "snoozed_until")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn load_spot(conn: &rusqlite::Connection, spot_id: &str) -> anyhow::Result<Option<Spot>> {
    let mut stmt = conn.prepare(&format!("SELECT {SPOT_COLUMNS} FROM spots WHERE id = ?1"))?;
    let mut rows = stmt.query(params![spot_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_spot(row)?)),
        None => Ok(None),
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SpotError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

impl Database {
    /// Register a new spot. Caller-supplied ids must be unused.
    pub async fn create_spot(&self, input: NewSpot) -> Result<Spot> {
        require_text("name", &input.name)?;
        require_text("image_source_ref", &input.image_source_ref)?;
        if let Some(id) = &input.id {
            require_text("id", id)?;
        }

        let id = input.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let spot_id = id.clone();
        let created = self
            .execute(move |conn| {
                if spot_exists(conn, &id)? {
                    return Ok(None);
                }

                let now = Utc::now();
                conn.execute(
                    "INSERT INTO spots (id, name, description, image_source_ref, state, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        id,
                        input.name.trim(),
                        input.description,
                        input.image_source_ref.trim(),
                        Occupancy::Unknown.as_str(),
                        format_datetime(&now),
                        format_datetime(&now),
                    ],
                )
                .with_context(|| "failed to insert spot")?;

                let spot = load_spot(conn, &id)?
                    .ok_or_else(|| anyhow!("spot {id} not found after insert"))?;
                Ok(Some(spot))
            })
            .await?;

        created.ok_or(SpotError::Conflict(spot_id))
    }

    pub async fn get_spot(&self, spot_id: &str) -> Result<Spot> {
        let id = spot_id.to_string();
        let spot = self.execute(move |conn| load_spot(conn, &id)).await?;
        found(spot, spot_id)
    }

    /// All spots in creation order.
    pub async fn list_spots(&self) -> Result<Vec<Spot>> {
        let spots = self
            .execute(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SPOT_COLUMNS} FROM spots ORDER BY created_at ASC, rowid ASC"
                ))?;
                let mut rows = stmt.query([])?;
                let mut spots = Vec::new();
                while let Some(row) = rows.next()? {
                    spots.push(row_to_spot(row)?);
                }
                Ok(spots)
            })
            .await?;
        Ok(spots)
    }

    pub async fn update_spot(&self, spot_id: &str, patch: SpotPatch) -> Result<Spot> {
        if patch.is_empty() {
            return Err(SpotError::Validation("no fields to update".into()));
        }
        if let Some(name) = &patch.name {
            require_text("name", name)?;
        }
        if let Some(source) = &patch.image_source_ref {
            require_text("image_source_ref", source)?;
        }

        let id = spot_id.to_string();
        let updated = self
            .execute(move |conn| {
                let mut updates = Vec::new();
                let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

                if let Some(name) = patch.name {
                    updates.push("name = ?");
                    params_vec.push(Box::new(name.trim().to_string()));
                }
                if let Some(description) = patch.description {
                    updates.push("description = ?");
                    params_vec.push(Box::new(description));
                }
                if let Some(source) = patch.image_source_ref {
                    updates.push("image_source_ref = ?");
                    params_vec.push(Box::new(source.trim().to_string()));
                }

                updates.push("updated_at = ?");
                params_vec.push(Box::new(format_datetime(&Utc::now())));
                params_vec.push(Box::new(id.clone()));

                let query = format!("UPDATE spots SET {} WHERE id = ?", updates.join(", "));
                let params_refs: Vec<&dyn rusqlite::ToSql> =
                    params_vec.iter().map(|b| b.as_ref()).collect();

                let rows_affected = conn
                    .execute(&query, params_refs.as_slice())
                    .with_context(|| "failed to update spot")?;
                if rows_affected == 0 {
                    return Ok(None);
                }

                load_spot(conn, &id)
            })
            .await?;
        found(updated, spot_id)
    }

    /// Remove a spot together with its whole check history.
    pub async fn delete_spot(&self, spot_id: &str) -> Result<()> {
        let id = spot_id.to_string();
        let deleted = self
            .execute(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM check_records WHERE spot_id = ?1", params![id])
                    .with_context(|| "failed to delete check history")?;
                let rows_affected = tx
                    .execute("DELETE FROM spots WHERE id = ?1", params![id])
                    .with_context(|| "failed to delete spot")?;
                tx.commit()?;
                Ok((rows_affected > 0).then_some(()))
            })
            .await?;
        found(deleted, spot_id)
    }

    pub async fn update_spot_state(
        &self,
        spot_id: &str,
        state: Occupancy,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        let id = spot_id.to_string();
        let updated = self
            .execute(move |conn| {
                let rows_affected = conn
                    .execute(
                        "UPDATE spots
                         SET state = ?1,
                             last_checked_at = ?2,
                             updated_at = ?3
                         WHERE id = ?4",
                        params![
                            state.as_str(),
                            format_datetime(&checked_at),
                            format_datetime(&Utc::now()),
                            id,
                        ],
                    )
                    .with_context(|| "failed to update spot state")?;
                Ok((rows_affected > 0).then_some(()))
            })
            .await?;
        found(updated, spot_id)
    }

    /// Set or clear the snooze deadline. Overwrites any earlier deadline.
    pub async fn set_snooze(&self, spot_id: &str, until: Option<DateTime<Utc>>) -> Result<()> {
        let id = spot_id.to_string();
        let updated = self
            .execute(move |conn| {
                let rows_affected = conn
                    .execute(
                        "UPDATE spots SET snoozed_until = ?1, updated_at = ?2 WHERE id = ?3",
                        params![
                            until.as_ref().map(format_datetime),
                            format_datetime(&Utc::now()),
                            id,
                        ],
                    )
                    .with_context(|| "failed to update snooze")?;
                Ok((rows_affected > 0).then_some(()))
            })
            .await?;
        found(updated, spot_id)
    }

    pub async fn clear_snooze(&self, spot_id: &str) -> Result<()> {
        self.set_snooze(spot_id, None).await
    }

    /// Drop the history and return the spot to `unknown`, unsnoozed.
    pub async fn reset_spot(&self, spot_id: &str) -> Result<()> {
        let id = spot_id.to_string();
        let reset = self
            .execute(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM check_records WHERE spot_id = ?1", params![id])
                    .with_context(|| "failed to clear check history")?;
                let rows_affected = tx
                    .execute(
                        "UPDATE spots
                         SET state = ?1,
                             last_checked_at = NULL,
                             snoozed_until = NULL,
                             updated_at = ?2
                         WHERE id = ?3",
                        params![Occupancy::Unknown.as_str(), format_datetime(&Utc::now()), id],
                    )
                    .with_context(|| "failed to reset spot")?;
                if rows_affected == 0 {
                    // Unknown spot: nothing was deleted, leave the transaction uncommitted.
                    return Ok(None);
                }
                tx.commit()?;
                Ok(Some(()))
            })
            .await?;
        found(reset, spot_id)
    }

    pub async fn count_spots(&self) -> Result<u64> {
        let count = self
            .execute(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM spots", [], |row| row.get(0))?;
                Ok(u64::try_from(count)?)
            })
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("spots.sqlite3")).unwrap();
        (dir, db)
    }

    fn sample(name: &str) -> NewSpot {
        NewSpot {
            id: None,
            name: name.into(),
            description: "Left bay in front of the garage".into(),
            image_source_ref: "camera.driveway".into(),
        }
    }

    #[tokio::test]
    async fn create_and_get_spot() {
        let (_dir, db) = test_db();
        let created = db.create_spot(sample("Driveway")).await.unwrap();

        assert_eq!(created.state, Occupancy::Unknown);
        assert_eq!(created.last_checked_at, None);
        assert_eq!(created.snoozed_until, None);

        let loaded = db.get_spot(&created.id).await.unwrap();
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn caller_supplied_duplicate_id_conflicts() {
        let (_dir, db) = test_db();
        let mut input = sample("Driveway");
        input.id = Some("driveway".into());

        db.create_spot(input.clone()).await.unwrap();
        let err = db.create_spot(input).await.unwrap_err();

        assert!(matches!(err, SpotError::Conflict(id) if id == "driveway"));
    }

    #[tokio::test]
    async fn create_rejects_blank_name() {
        let (_dir, db) = test_db();
        let err = db.create_spot(sample("   ")).await.unwrap_err();
        assert!(matches!(err, SpotError::Validation(_)));
    }

    #[tokio::test]
    async fn get_unknown_spot_is_not_found() {
        let (_dir, db) = test_db();
        let err = db.get_spot("missing").await.unwrap_err();
        assert!(matches!(err, SpotError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn list_spots_keeps_creation_order() {
        let (_dir, db) = test_db();
        for name in ["First", "Second", "Third"] {
            db.create_spot(sample(name)).await.unwrap();
        }

        let names: Vec<String> = db
            .list_spots()
            .await
            .unwrap()
            .into_iter()
            .map(|spot| spot.name)
            .collect();
        assert_eq!(names, vec!["First", "Second", "Third"]);
        assert_eq!(db.count_spots().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn update_spot_changes_only_given_fields() {
        let (_dir, db) = test_db();
        let spot = db.create_spot(sample("Driveway")).await.unwrap();

        let updated = db
            .update_spot(
                &spot.id,
                SpotPatch {
                    name: Some("Street".into()),
                    ..SpotPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Street");
        assert_eq!(updated.image_source_ref, spot.image_source_ref);
        assert_eq!(updated.description, spot.description);

        let err = db.update_spot(&spot.id, SpotPatch::default()).await.unwrap_err();
        assert!(matches!(err, SpotError::Validation(_)));

        let err = db
            .update_spot(
                "missing",
                SpotPatch {
                    description: Some("x".into()),
                    ..SpotPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SpotError::NotFound(_)));
    }

    #[tokio::test]
    async fn set_snooze_overwrites_previous_deadline() {
        let (_dir, db) = test_db();
        let spot = db.create_spot(sample("Driveway")).await.unwrap();
        let first = Utc::now() + Duration::hours(1);
        let second = Utc::now() + Duration::hours(3);

        db.set_snooze(&spot.id, Some(first)).await.unwrap();
        db.set_snooze(&spot.id, Some(second)).await.unwrap();
        assert_eq!(db.get_spot(&spot.id).await.unwrap().snoozed_until, Some(second));

        db.clear_snooze(&spot.id).await.unwrap();
        assert_eq!(db.get_spot(&spot.id).await.unwrap().snoozed_until, None);

        let err = db.set_snooze("missing", Some(first)).await.unwrap_err();
        assert!(matches!(err, SpotError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_state_records_check_time() {
        let (_dir, db) = test_db();
        let spot = db.create_spot(sample("Driveway")).await.unwrap();
        let checked_at = Utc::now();

        db.update_spot_state(&spot.id, Occupancy::Free, checked_at)
            .await
            .unwrap();

        let loaded = db.get_spot(&spot.id).await.unwrap();
        assert_eq!(loaded.state, Occupancy::Free);
        assert_eq!(loaded.last_checked_at, Some(checked_at));
    }

    #[tokio::test]
    async fn delete_unknown_spot_is_not_found() {
        let (_dir, db) = test_db();
        let err = db.delete_spot("missing").await.unwrap_err();
        assert!(matches!(err, SpotError::NotFound(_)));
    }

    #[tokio::test]
    async fn reset_unknown_spot_is_not_found() {
        let (_dir, db) = test_db();
        let err = db.reset_spot("missing").await.unwrap_err();
        assert!(matches!(err, SpotError::NotFound(_)));
    }
}
