//! Schema versioning and additive migrations.
//!
//! The schema is declared idempotently in [`crate::schema`]; this module
//! records the version marker and adds columns to known tables when a
//! database predates them. Destructive changes are out of scope.

use crate::schema::SCHEMA_VERSION;
use crate::util::db_err;
use elf_core::error::Result;
use libsql::{params, Connection};
use tracing::{debug, info};

/// Columns added after a table's first release: `(table, column, ddl)`.
/// Each entry is applied only when the column is missing.
const ADDITIVE_COLUMNS: &[(&str, &str, &str)] = &[
    (
        "heuristics",
        "revival_conditions",
        "ALTER TABLE heuristics ADD COLUMN revival_conditions TEXT",
    ),
    (
        "heuristics",
        "project_path",
        "ALTER TABLE heuristics ADD COLUMN project_path TEXT DEFAULT NULL",
    ),
    (
        "fraud_reports",
        "review_outcome",
        "ALTER TABLE fraud_reports ADD COLUMN review_outcome TEXT",
    ),
];

/// Apply version bookkeeping and any pending additive migrations.
pub(crate) async fn run(conn: &Connection) -> Result<()> {
    for (table, column, ddl) in ADDITIVE_COLUMNS {
        if !column_exists(conn, table, column).await? {
            info!(table, column, "Adding missing column");
            conn.execute(ddl, ()).await.map_err(db_err)?;
        }
    }

    let current = current_version(conn).await?;
    if current < SCHEMA_VERSION {
        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version, applied_at, description)
             VALUES (?, ?, ?)",
            params![
                SCHEMA_VERSION,
                chrono::Utc::now().timestamp_millis(),
                "idempotent schema sync"
            ],
        )
        .await
        .map_err(db_err)?;
        debug!(from = current, to = SCHEMA_VERSION, "Recorded schema version");
    }
    Ok(())
}

pub(crate) async fn current_version(conn: &Connection) -> Result<i64> {
    let mut rows = conn
        .query("SELECT MAX(version) FROM schema_version", ())
        .await
        .map_err(db_err)?;
    if let Some(row) = rows.next().await.map_err(db_err)? {
        let version: Option<i64> = row.get(0).ok();
        return Ok(version.unwrap_or(0));
    }
    Ok(0)
}

async fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    // PRAGMA table_info does not accept bound parameters; the table names
    // here come from the compile-time list above, never from callers.
    let mut rows = conn
        .query(&format!("PRAGMA table_info({table})"), ())
        .await
        .map_err(db_err)?;
    while let Some(row) = rows.next().await.map_err(db_err)? {
        let name: String = row.get(1).map_err(db_err)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
