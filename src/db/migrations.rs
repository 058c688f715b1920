use anyhow::{bail, Context, Result};
use log::info;
use rusqlite::Connection;

/// Schema scripts in order; entry `n` moves the schema from version `n` to `n + 1`.
const MIGRATIONS: [&str; 1] = [include_str!("schemas/schema_v1.sql")];

const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Bring the schema up to date in one transaction, tracked in `user_version`.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if found > CURRENT_SCHEMA_VERSION {
        bail!("database schema v{found} is newer than supported v{CURRENT_SCHEMA_VERSION}");
    }
    let applied = usize::try_from(found)
        .with_context(|| format!("invalid schema version {found}"))?;
    let pending = &MIGRATIONS[applied..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;
    for (step, script) in pending.iter().enumerate() {
        let target = applied + step + 1;
        tx.execute_batch(script)
            .with_context(|| format!("failed to migrate schema to v{target}"))?;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    info!("Spot store schema migrated from v{found} to v{CURRENT_SCHEMA_VERSION}");
    Ok(())
}
