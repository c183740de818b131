//! Heuristic rows, confidence transitions, and lifecycle status writes.

use crate::retry::with_retry;
use crate::util::{
    db_err, format_date, from_millis, opt_from_millis, parse_date, to_millis,
};
use crate::ElfStorage;
use chrono::{DateTime, Utc};
use elf_core::error::{Error, Result};
use elf_core::model::{
    ConfidenceUpdate, Heuristic, HeuristicStatus, NewHeuristic, SourceType, UpdateType,
};
use elf_core::storage::{ConfidenceTransition, EvictionCandidate, HeuristicQuery, NewConfidenceUpdate};
use libsql::params;
use tracing::debug;

/// Column list for every heuristic SELECT; order matches
/// [`row_to_heuristic`].
pub(crate) const HEURISTIC_COLUMNS: &str = "id, domain, rule, explanation, source_type, source_id, \
     confidence, confidence_ema, ema_alpha, ema_warmup_remaining, \
     times_validated, times_violated, times_contradicted, times_revived, \
     is_golden, status, dormant_since, revival_conditions, \
     last_used_at, last_confidence_update, update_count_today, update_count_reset_date, \
     min_applications, fraud_flags, is_quarantined, last_fraud_check, \
     project_path, created_at, updated_at";

pub(crate) fn row_to_heuristic(row: &libsql::Row) -> Result<Heuristic> {
    let status_text: String = row.get(15).map_err(db_err)?;
    let status = HeuristicStatus::parse(&status_text)
        .ok_or_else(|| Error::Database(format!("Unknown heuristic status: {status_text}")))?;
    let source_type: Option<String> = row.get(4).ok();

    Ok(Heuristic {
        id: row.get(0).map_err(db_err)?,
        domain: row.get(1).map_err(db_err)?,
        rule: row.get(2).map_err(db_err)?,
        explanation: row.get(3).ok(),
        source_type: source_type.as_deref().and_then(SourceType::parse),
        source_id: row.get(5).ok(),
        confidence: row.get(6).map_err(db_err)?,
        confidence_ema: row.get(7).ok(),
        ema_alpha: row.get(8).ok(),
        ema_warmup_remaining: row.get(9).map_err(db_err)?,
        times_validated: row.get(10).map_err(db_err)?,
        times_violated: row.get(11).map_err(db_err)?,
        times_contradicted: row.get(12).map_err(db_err)?,
        times_revived: row.get(13).map_err(db_err)?,
        is_golden: row.get::<i64>(14).map_err(db_err)? != 0,
        status,
        dormant_since: opt_from_millis(row.get(16).ok()),
        revival_conditions: row.get(17).ok(),
        last_used_at: opt_from_millis(row.get(18).ok()),
        last_confidence_update: opt_from_millis(row.get(19).ok()),
        update_count_today: row.get(20).map_err(db_err)?,
        update_count_reset_date: parse_date(row.get(21).ok()),
        min_applications: row.get(22).map_err(db_err)?,
        fraud_flags: row.get(23).map_err(db_err)?,
        is_quarantined: row.get::<i64>(24).map_err(db_err)? != 0,
        last_fraud_check: opt_from_millis(row.get(25).ok()),
        project_path: row.get(26).ok(),
        created_at: from_millis(row.get(27).map_err(db_err)?),
        updated_at: from_millis(row.get(28).map_err(db_err)?),
    })
}

fn row_to_confidence_update(row: &libsql::Row) -> Result<ConfidenceUpdate> {
    let type_text: String = row.get(5).map_err(db_err)?;
    let update_type = UpdateType::parse(&type_text)
        .ok_or_else(|| Error::Database(format!("Unknown update type: {type_text}")))?;
    Ok(ConfidenceUpdate {
        id: row.get(0).map_err(db_err)?,
        heuristic_id: row.get(1).map_err(db_err)?,
        old_confidence: row.get(2).map_err(db_err)?,
        new_confidence: row.get(3).map_err(db_err)?,
        delta: row.get(4).map_err(db_err)?,
        update_type,
        reason: row.get(6).ok(),
        session_id: row.get(7).ok(),
        agent_id: row.get(8).ok(),
        rate_limited: row.get::<i64>(9).map_err(db_err)? != 0,
        raw_target_confidence: row.get(10).ok(),
        smoothed_delta: row.get(11).ok(),
        alpha_used: row.get(12).ok(),
        created_at: from_millis(row.get(13).map_err(db_err)?),
    })
}

const CONFIDENCE_UPDATE_COLUMNS: &str = "id, heuristic_id, old_confidence, new_confidence, delta, update_type, \
     reason, session_id, agent_id, rate_limited, \
     raw_target_confidence, smoothed_delta, alpha_used, created_at";

impl ElfStorage {
    pub(crate) async fn insert_heuristic_row(
        &self,
        new: &NewHeuristic,
        ema_alpha: f64,
        ema_warmup: i64,
    ) -> Result<Heuristic> {
        let conn = self.conn().await?;
        let now = to_millis(Utc::now());

        with_retry("insert_heuristic", || async {
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
            .map_err(|e| Error::Database(format!("Failed to insert heuristic: {e}")))
        })
        .await?;

        let id = conn.last_insert_rowid();
        self.get_heuristic_row(id)
            .await?
            .ok_or_else(|| Error::Internal(format!("inserted heuristic {id} not found")))
    }

    pub(crate) async fn get_heuristic_row(&self, id: i64) -> Result<Option<Heuristic>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {HEURISTIC_COLUMNS} FROM heuristics WHERE id = ?");
        let mut rows = conn.query(&sql, [id]).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_heuristic(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn list_heuristic_rows(
        &self,
        query: &HeuristicQuery,
    ) -> Result<Vec<Heuristic>> {
        let conn = self.conn().await?;

        let mut sql = format!("SELECT {HEURISTIC_COLUMNS} FROM heuristics WHERE 1=1");
        let mut bound: Vec<libsql::Value> = Vec::new();

        if let Some(domain) = &query.domain {
            sql.push_str(" AND domain = ?");
            bound.push(libsql::Value::Text(domain.clone()));
        }
        // Location scoping: global rows always, pinned rows only from their path
        match &query.current_location {
            Some(location) => {
                sql.push_str(" AND (project_path IS NULL OR project_path = ?)");
                bound.push(libsql::Value::Text(location.clone()));
            }
            None => sql.push_str(" AND project_path IS NULL"),
        }
        if query.include_dormant {
            sql.push_str(" AND status IN ('active', 'dormant')");
        } else {
            sql.push_str(" AND status = 'active'");
        }
        sql.push_str(" ORDER BY confidence DESC, times_validated DESC");
        if let Some(limit) = query.limit {
            // limit has been range-validated by the caller
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut rows =
            conn.query(&sql, libsql::params_from_iter(bound)).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_heuristic(&row)?);
        }
        Ok(out)
    }

    pub(crate) async fn list_active_in_domain(&self, domain: &str) -> Result<Vec<Heuristic>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {HEURISTIC_COLUMNS} FROM heuristics
             WHERE domain = ? AND status = 'active'
             ORDER BY confidence DESC"
        );
        let mut rows = conn.query(&sql, [domain]).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_heuristic(&row)?);
        }
        Ok(out)
    }

    /// Apply a lifecycle transition and append its audit row in one
    /// transaction; either both persist or neither does.
    pub(crate) async fn record_confidence_transition_row(
        &self,
        heuristic_id: i64,
        transition: &ConfidenceTransition,
        update: &NewConfidenceUpdate,
    ) -> Result<ConfidenceUpdate> {
        let conn = self.conn().await?;
        let now = to_millis(Utc::now());

        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(db_err)?;
        let result: Result<i64> = async {
            conn.execute(
                "UPDATE heuristics SET
                    confidence = ?, confidence_ema = ?, ema_warmup_remaining = ?,
                    times_validated = ?, times_violated = ?, times_contradicted = ?,
                    times_revived = ?, status = ?, dormant_since = ?,
                    last_used_at = ?, last_confidence_update = ?,
                    update_count_today = ?, update_count_reset_date = ?,
                    updated_at = ?
                 WHERE id = ?",
                params![
                    transition.confidence,
                    transition.confidence_ema,
                    transition.ema_warmup_remaining,
                    transition.times_validated,
                    transition.times_violated,
                    transition.times_contradicted,
                    transition.times_revived,
                    transition.status.as_str(),
                    transition.dormant_since.map(to_millis),
                    transition.last_used_at.map(to_millis),
                    transition.last_confidence_update.map(to_millis),
                    transition.update_count_today,
                    format_date(transition.update_count_reset_date),
                    now,
                    heuristic_id,
                ],
            )
            .await
            .map_err(db_err)?;

            conn.execute(
                "INSERT INTO confidence_updates (
                    heuristic_id, old_confidence, new_confidence, delta, update_type,
                    reason, session_id, agent_id, rate_limited,
                    raw_target_confidence, smoothed_delta, alpha_used, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    heuristic_id,
                    update.old_confidence,
                    update.new_confidence,
                    update.delta,
                    update.update_type.as_str(),
                    update.reason.clone(),
                    update.session_id.clone(),
                    update.agent_id.clone(),
                    i64::from(update.rate_limited),
                    update.raw_target_confidence,
                    update.smoothed_delta,
                    update.alpha_used,
                    now,
                ],
            )
            .await
            .map_err(db_err)?;
            Ok(conn.last_insert_rowid())
        }
        .await;

        match result {
            Ok(update_id) => {
                conn.execute("COMMIT", ()).await.map_err(db_err)?;
                debug!(heuristic_id, update_id, "Recorded confidence transition");
                Ok(ConfidenceUpdate {
                    id: update_id,
                    heuristic_id,
                    old_confidence: update.old_confidence,
                    new_confidence: update.new_confidence,
                    delta: update.delta,
                    update_type: update.update_type,
                    reason: update.reason.clone(),
                    session_id: update.session_id.clone(),
                    agent_id: update.agent_id.clone(),
                    rate_limited: update.rate_limited,
                    raw_target_confidence: update.raw_target_confidence,
                    smoothed_delta: update.smoothed_delta,
                    alpha_used: update.alpha_used,
                    created_at: from_millis(now),
                })
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    pub(crate) async fn set_heuristic_status_row(
        &self,
        heuristic_id: i64,
        status: HeuristicStatus,
        dormant_since: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE heuristics SET status = ?, dormant_since = ?, updated_at = ? WHERE id = ?",
            params![
                status.as_str(),
                dormant_since.map(to_millis),
                to_millis(Utc::now()),
                heuristic_id,
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub(crate) async fn list_confidence_update_rows(
        &self,
        heuristic_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConfidenceUpdate>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {CONFIDENCE_UPDATE_COLUMNS} FROM confidence_updates
             WHERE heuristic_id = ? AND created_at > ?
             ORDER BY created_at ASC, id ASC"
        );
        let mut rows =
            conn.query(&sql, params![heuristic_id, to_millis(since)]).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_confidence_update(&row)?);
        }
        Ok(out)
    }

    pub(crate) async fn list_fraud_candidates(
        &self,
        stale_before: DateTime<Utc>,
        min_applications: i64,
        limit: i64,
    ) -> Result<Vec<Heuristic>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {HEURISTIC_COLUMNS} FROM heuristics
             WHERE (last_fraud_check IS NULL OR last_fraud_check < ?)
               AND (times_validated + times_violated + times_contradicted) >= ?
               AND status = 'active'
             ORDER BY last_fraud_check ASC NULLS FIRST
             LIMIT {limit}"
        );
        let mut rows = conn
            .query(&sql, params![to_millis(stale_before), min_applications])
            .await
            .map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_heuristic(&row)?);
        }
        Ok(out)
    }

    pub(crate) async fn list_dormant_rows(&self) -> Result<Vec<Heuristic>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {HEURISTIC_COLUMNS} FROM heuristics WHERE status = 'dormant'"
        );
        let mut rows = conn.query(&sql, ()).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_heuristic(&row)?);
        }
        Ok(out)
    }

    pub(crate) async fn list_eviction_candidate_rows(
        &self,
        domain: &str,
    ) -> Result<Vec<EvictionCandidate>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, domain, status, eviction_score
                 FROM eviction_candidates WHERE domain = ?
                 ORDER BY eviction_score ASC",
                [domain],
            )
            .await
            .map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let status_text: String = row.get(2).map_err(db_err)?;
            out.push(EvictionCandidate {
                heuristic_id: row.get(0).map_err(db_err)?,
                domain: row.get(1).map_err(db_err)?,
                status: HeuristicStatus::parse(&status_text).ok_or_else(|| {
                    Error::Database(format!("Unknown status in view: {status_text}"))
                })?,
                eviction_score: row.get(3).map_err(db_err)?,
            });
        }
        Ok(out)
    }
}
