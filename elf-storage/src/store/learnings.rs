//! Learning rows.

use crate::retry::with_retry;
use crate::util::{db_err, from_millis, to_millis};
use crate::ElfStorage;
use chrono::Utc;
use elf_core::error::{Error, Result};
use elf_core::model::{Learning, LearningType, NewLearning};
use libsql::params;

const LEARNING_COLUMNS: &str =
    "id, type, filepath, title, summary, tags, domain, severity, created_at, updated_at";

fn row_to_learning(row: &libsql::Row) -> Result<Learning> {
    let type_text: String = row.get(1).map_err(db_err)?;
    let learning_type = LearningType::parse(&type_text)
        .ok_or_else(|| Error::Database(format!("Unknown learning type: {type_text}")))?;
    Ok(Learning {
        id: row.get(0).map_err(db_err)?,
        learning_type,
        filepath: row.get(2).map_err(db_err)?,
        title: row.get(3).map_err(db_err)?,
        summary: row.get(4).ok(),
        tags: row.get(5).ok(),
        domain: row.get(6).ok(),
        severity: row.get(7).map_err(db_err)?,
        created_at: from_millis(row.get(8).map_err(db_err)?),
        updated_at: from_millis(row.get(9).map_err(db_err)?),
    })
}

impl ElfStorage {
    pub(crate) async fn insert_learning_row(&self, new: &NewLearning) -> Result<Learning> {
        let conn = self.conn().await?;
        let now = to_millis(Utc::now());

        with_retry("insert_learning", || async {
            conn.execute(
                "INSERT INTO learnings (type, filepath, title, summary, tags, domain, severity, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    new.learning_type.as_str(),
                    new.filepath.clone(),
                    new.title.clone(),
                    new.summary.clone(),
                    new.tags.clone(),
                    new.domain.clone(),
                    new.severity,
                    now,
                    now,
                ],
            )
            .await
            .map_err(|e| Error::Database(format!("Failed to insert learning: {e}")))
        })
        .await?;

        let id = conn.last_insert_rowid();
        let sql = format!("SELECT {LEARNING_COLUMNS} FROM learnings WHERE id = ?");
        let mut rows = conn.query(&sql, [id]).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => row_to_learning(&row),
            None => Err(Error::Internal(format!("inserted learning {id} not found"))),
        }
    }

    pub(crate) async fn list_learnings_by_domain_rows(
        &self,
        domain: &str,
        limit: i64,
    ) -> Result<Vec<Learning>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {LEARNING_COLUMNS} FROM learnings
             WHERE domain = ? ORDER BY created_at DESC LIMIT {limit}"
        );
        let mut rows = conn.query(&sql, [domain]).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_learning(&row)?);
        }
        Ok(out)
    }

    pub(crate) async fn list_learnings_by_tags_rows(
        &self,
        tags: &[String],
        limit: i64,
    ) -> Result<Vec<Learning>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn().await?;
        let conditions = vec!["tags LIKE ?"; tags.len()].join(" OR ");
        let sql = format!(
            "SELECT {LEARNING_COLUMNS} FROM learnings
             WHERE {conditions} ORDER BY created_at DESC LIMIT {limit}"
        );
        let bound: Vec<libsql::Value> =
            tags.iter().map(|t| libsql::Value::Text(format!("%{t}%"))).collect();
        let mut rows =
            conn.query(&sql, libsql::params_from_iter(bound)).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_learning(&row)?);
        }
        Ok(out)
    }

    pub(crate) async fn list_recent_learning_rows(
        &self,
        type_filter: Option<LearningType>,
        limit: i64,
    ) -> Result<Vec<Learning>> {
        let conn = self.conn().await?;
        let mut out = Vec::new();
        if let Some(learning_type) = type_filter {
            let sql = format!(
                "SELECT {LEARNING_COLUMNS} FROM learnings
                 WHERE type = ? ORDER BY created_at DESC LIMIT {limit}"
            );
            let mut rows =
                conn.query(&sql, [learning_type.as_str()]).await.map_err(db_err)?;
            while let Some(row) = rows.next().await.map_err(db_err)? {
                out.push(row_to_learning(&row)?);
            }
        } else {
            let sql = format!(
                "SELECT {LEARNING_COLUMNS} FROM learnings
                 ORDER BY created_at DESC LIMIT {limit}"
            );
            let mut rows = conn.query(&sql, ()).await.map_err(db_err)?;
            while let Some(row) = rows.next().await.map_err(db_err)? {
                out.push(row_to_learning(&row)?);
            }
        }
        Ok(out)
    }
}
