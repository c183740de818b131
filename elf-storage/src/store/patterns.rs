//! Pattern rows: observer upserts and distiller promotion.

use crate::store::row_to_heuristic;
use crate::store::heuristics::HEURISTIC_COLUMNS;
use crate::util::{db_err, from_millis, to_millis, parse_string_list};
use crate::ElfStorage;
use chrono::{DateTime, Utc};
use elf_core::error::{Error, Result};
use elf_core::model::{ExtractedPattern, Heuristic, NewHeuristic, Pattern, PatternKind};
use libsql::params;
use tracing::debug;

const PATTERN_COLUMNS: &str = "id, pattern_type, pattern_text, signature, pattern_hash, occurrence_count, \
     first_seen, last_seen, session_ids, domain, project_path, strength, \
     promoted_to_heuristic_id, created_at, updated_at";

fn row_to_pattern(row: &libsql::Row) -> Result<Pattern> {
    let kind_text: String = row.get(1).map_err(db_err)?;
    let kind = PatternKind::parse(&kind_text)
        .ok_or_else(|| Error::Database(format!("Unknown pattern type: {kind_text}")))?;
    Ok(Pattern {
        id: row.get(0).map_err(db_err)?,
        kind,
        pattern_text: row.get(2).map_err(db_err)?,
        signature: row.get(3).map_err(db_err)?,
        pattern_hash: row.get(4).map_err(db_err)?,
        occurrence_count: row.get(5).map_err(db_err)?,
        first_seen: from_millis(row.get(6).map_err(db_err)?),
        last_seen: from_millis(row.get(7).map_err(db_err)?),
        session_ids: parse_string_list(row.get(8).ok()),
        domain: row.get(9).map_err(db_err)?,
        project_path: row.get(10).ok(),
        strength: row.get(11).map_err(db_err)?,
        promoted_to_heuristic_id: row.get(12).ok(),
        created_at: from_millis(row.get(13).map_err(db_err)?),
        updated_at: from_millis(row.get(14).map_err(db_err)?),
    })
}

impl ElfStorage {
    pub(crate) async fn get_pattern_by_hash_row(
        &self,
        pattern_hash: &str,
    ) -> Result<Option<Pattern>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE pattern_hash = ?");
        let mut rows = conn.query(&sql, [pattern_hash]).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_pattern(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn insert_pattern_row(
        &self,
        extracted: &ExtractedPattern,
        pattern_hash: &str,
        strength: f64,
    ) -> Result<Pattern> {
        let conn = self.conn().await?;
        let now = to_millis(Utc::now());
        conn.execute(
            "INSERT INTO patterns (
                pattern_type, pattern_text, signature, pattern_hash, occurrence_count,
                first_seen, last_seen, session_ids, domain, project_path, strength,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                extracted.kind.as_str(),
                extracted.pattern_text.clone(),
                extracted.signature.clone(),
                pattern_hash,
                extracted.occurrence_count.max(1),
                now,
                now,
                serde_json::to_string(&extracted.session_ids)?,
                extracted.domain.clone(),
                extracted.project_path.clone(),
                strength.clamp(0.0, 1.0),
                now,
                now,
            ],
        )
        .await
        .map_err(|e| Error::Database(format!("Failed to insert pattern: {e}")))?;

        let id = conn.last_insert_rowid();
        debug!(pattern_id = id, hash = pattern_hash, "Inserted pattern");
        let sql = format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE id = ?");
        let mut rows = conn.query(&sql, [id]).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => row_to_pattern(&row),
            None => Err(Error::Internal(format!("inserted pattern {id} not found"))),
        }
    }

    pub(crate) async fn reinforce_pattern_row(
        &self,
        pattern_id: i64,
        occurrence_increment: i64,
        strength: f64,
        session_ids: &[String],
        last_seen: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE patterns SET
                occurrence_count = occurrence_count + ?,
                strength = ?,
                session_ids = ?,
                last_seen = ?,
                updated_at = ?
             WHERE id = ?",
            params![
                occurrence_increment,
                strength.clamp(0.0, 1.0),
                serde_json::to_string(session_ids)?,
                to_millis(last_seen),
                to_millis(Utc::now()),
                pattern_id,
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub(crate) async fn list_pattern_rows(
        &self,
        project_path: Option<&str>,
        unpromoted_only: bool,
    ) -> Result<Vec<Pattern>> {
        let conn = self.conn().await?;
        let mut sql = format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE 1=1");
        let mut bound: Vec<libsql::Value> = Vec::new();
        if let Some(project) = project_path {
            sql.push_str(" AND project_path = ?");
            bound.push(libsql::Value::Text(project.to_string()));
        }
        if unpromoted_only {
            sql.push_str(" AND promoted_to_heuristic_id IS NULL");
        }
        sql.push_str(" ORDER BY strength DESC, occurrence_count DESC");

        let mut rows =
            conn.query(&sql, libsql::params_from_iter(bound)).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_pattern(&row)?);
        }
        Ok(out)
    }

    pub(crate) async fn set_pattern_strength_row(
        &self,
        pattern_id: i64,
        strength: f64,
    ) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE patterns SET strength = ?, updated_at = ? WHERE id = ?",
            params![strength.clamp(0.0, 1.0), to_millis(Utc::now()), pattern_id],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Create the promoted heuristic and stamp the pattern in one
    /// transaction; a failure rolls both back.
    pub(crate) async fn promote_pattern_row(
        &self,
        pattern_id: i64,
        new: &NewHeuristic,
        ema_alpha: f64,
        ema_warmup: i64,
    ) -> Result<Heuristic> {
        let conn = self.conn().await?;
        let now = to_millis(Utc::now());

        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(db_err)?;
        let result: Result<i64> = async {
            conn.execute(
                "INSERT INTO heuristics (
                    domain, rule, explanation, source_type, source_id,
                    confidence, confidence_ema, ema_alpha, ema_warmup_remaining,
                    times_validated, is_golden, project_path, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    new.domain.clone(),
                    new.rule.clone(),
                    new.explanation.clone(),
                    new.source_type.as_str(),
                    new.source_id,
                    new.confidence,
                    new.confidence,
                    ema_alpha,
                    ema_warmup,
                    new.times_validated,
                    i64::from(new.is_golden),
                    new.project_path.clone(),
                    now,
                    now,
                ],
            )
            .await
            .map_err(db_err)?;
            let heuristic_id = conn.last_insert_rowid();

            let changed = conn
                .execute(
                    "UPDATE patterns SET promoted_to_heuristic_id = ?, updated_at = ?
                     WHERE id = ? AND promoted_to_heuristic_id IS NULL",
                    params![heuristic_id, now, pattern_id],
                )
                .await
                .map_err(db_err)?;
            if changed == 0 {
                return Err(Error::Database(format!(
                    "pattern {pattern_id} missing or already promoted"
                )));
            }
            Ok(heuristic_id)
        }
        .await;

        match result {
            Ok(heuristic_id) => {
                conn.execute("COMMIT", ()).await.map_err(db_err)?;
                let sql =
                    format!("SELECT {HEURISTIC_COLUMNS} FROM heuristics WHERE id = ?");
                let mut rows = conn.query(&sql, [heuristic_id]).await.map_err(db_err)?;
                match rows.next().await.map_err(db_err)? {
                    Some(row) => row_to_heuristic(&row),
                    None => {
                        Err(Error::Internal(format!("promoted heuristic {heuristic_id} not found")))
                    }
                }
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }
}
