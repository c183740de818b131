//! Query audit rows, knowledge-base statistics, and database validation.

use crate::schema::REQUIRED_TABLES;
use crate::util::{db_err, to_millis};
use crate::ElfStorage;
use chrono::{Duration, Utc};
use elf_core::error::Result;
use elf_core::model::{Statistics, ValidationReport};
use elf_core::storage::{AuditClose, AuditOpen};
use libsql::params;
use serde_json::json;
use std::collections::BTreeMap;

impl ElfStorage {
    pub(crate) async fn open_query_audit_row(&self, open: &AuditOpen) -> Result<i64> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO building_queries
                (query_type, session_id, agent_id, domain, tags,
                 limit_requested, max_tokens_requested, query_summary, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                open.query_type.clone(),
                open.session_id.clone(),
                open.agent_id.clone(),
                open.domain.clone(),
                open.tags.clone(),
                open.limit_requested,
                open.max_tokens_requested,
                open.query_summary.clone(),
                to_millis(Utc::now()),
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) async fn finalize_query_audit_row(
        &self,
        audit_id: i64,
        close: &AuditClose,
    ) -> Result<()> {
        let conn = self.conn().await?;
        let status = close
            .status
            .unwrap_or(elf_core::model::QueryStatus::Success)
            .as_str();
        conn.execute(
            "UPDATE building_queries SET
                status = ?, error_message = ?, error_code = ?, duration_ms = ?,
                results_returned = ?, tokens_approximated = ?,
                golden_rules_returned = ?, heuristics_count = ?, learnings_count = ?,
                experiments_count = ?, ceo_reviews_count = ?, completed_at = ?
             WHERE id = ?",
            params![
                status,
                close.error_message.clone(),
                close.error_code.clone(),
                close.duration_ms,
                close.results_returned,
                close.tokens_approximated,
                close.golden_rules_returned,
                close.heuristics_count,
                close.learnings_count,
                close.experiments_count,
                close.ceo_reviews_count,
                to_millis(Utc::now()),
                audit_id,
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub(crate) async fn statistics_row(&self) -> Result<Statistics> {
        let conn = self.conn().await?;
        let mut stats = Statistics::default();

        let counts: &mut [(&str, &mut i64)] = &mut [
            ("SELECT COUNT(*) FROM learnings", &mut stats.total_learnings),
            ("SELECT COUNT(*) FROM heuristics", &mut stats.total_heuristics),
            ("SELECT COUNT(*) FROM patterns", &mut stats.total_patterns),
            ("SELECT COUNT(*) FROM experiments", &mut stats.total_experiments),
            ("SELECT COUNT(*) FROM ceo_reviews", &mut stats.total_ceo_reviews),
            ("SELECT COUNT(*) FROM heuristics WHERE is_golden = 1", &mut stats.golden_heuristics),
        ];
        for (sql, slot) in counts.iter_mut() {
            let mut rows = conn.query(sql, ()).await.map_err(db_err)?;
            if let Some(row) = rows.next().await.map_err(db_err)? {
                **slot = row.get(0).map_err(db_err)?;
            }
        }

        async fn grouped(
            conn: &libsql::Connection,
            sql: &str,
        ) -> Result<BTreeMap<String, i64>> {
            let mut map = BTreeMap::new();
            let mut rows = conn.query(sql, ()).await.map_err(db_err)?;
            while let Some(row) = rows.next().await.map_err(db_err)? {
                let key: Option<String> = row.get(0).ok();
                let count: i64 = row.get(1).map_err(db_err)?;
                map.insert(key.unwrap_or_else(|| "unknown".to_string()), count);
            }
            Ok(map)
        }

        stats.learnings_by_type =
            grouped(&conn, "SELECT type, COUNT(*) FROM learnings GROUP BY type").await?;
        stats.learnings_by_domain =
            grouped(&conn, "SELECT domain, COUNT(*) FROM learnings GROUP BY domain").await?;
        stats.heuristics_by_domain =
            grouped(&conn, "SELECT domain, COUNT(*) FROM heuristics GROUP BY domain").await?;
        stats.experiments_by_status =
            grouped(&conn, "SELECT status, COUNT(*) FROM experiments GROUP BY status").await?;
        stats.ceo_reviews_by_status =
            grouped(&conn, "SELECT status, COUNT(*) FROM ceo_reviews GROUP BY status").await?;

        let cutoff = to_millis(Utc::now() - Duration::days(7));
        let mut rows = conn
            .query("SELECT COUNT(*) FROM violations WHERE violation_date >= ?", [cutoff])
            .await
            .map_err(db_err)?;
        if let Some(row) = rows.next().await.map_err(db_err)? {
            stats.violations_7d = row.get(0).map_err(db_err)?;
        }

        Ok(stats)
    }

    /// Integrity, foreign keys, required tables, core invariants, and
    /// writer-ownership spot checks.
    pub(crate) async fn validate_database_row(&self) -> Result<ValidationReport> {
        let conn = self.conn().await?;
        let mut report = ValidationReport::new();

        // PRAGMA integrity
        let mut rows = conn.query("PRAGMA integrity_check", ()).await.map_err(db_err)?;
        if let Some(row) = rows.next().await.map_err(db_err)? {
            let verdict: String = row.get(0).map_err(db_err)?;
            report.check("integrity", json!(verdict));
            if verdict != "ok" {
                report.error(format!("Database integrity check failed: {verdict}"));
            }
        }

        // Foreign keys
        let mut rows = conn.query("PRAGMA foreign_key_check", ()).await.map_err(db_err)?;
        let mut fk_violations = 0;
        while rows.next().await.map_err(db_err)?.is_some() {
            fk_violations += 1;
        }
        if fk_violations > 0 {
            report.error(format!("Foreign key violations: {fk_violations}"));
        }

        // Required tables
        let mut existing = Vec::new();
        let mut rows = conn
            .query("SELECT name FROM sqlite_master WHERE type = 'table'", ())
            .await
            .map_err(db_err)?;
        while let Some(row) = rows.next().await.map_err(db_err)? {
            existing.push(row.get::<String>(0).map_err(db_err)?);
        }
        for table in REQUIRED_TABLES {
            if !existing.iter().any(|t| t == table) {
                report.error(format!("Required table '{table}' is missing"));
            }
        }
        report.check("tables", json!(existing));

        // Invariant: confidence bounds and non-negative counters
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM heuristics
                 WHERE confidence < 0 OR confidence > 1
                    OR times_validated < 0 OR times_violated < 0 OR times_contradicted < 0",
                (),
            )
            .await
            .map_err(db_err)?;
        if let Some(row) = rows.next().await.map_err(db_err)? {
            let bad: i64 = row.get(0).map_err(db_err)?;
            report.check("heuristic_bounds_violations", json!(bad));
            if bad > 0 {
                report.error(format!("{bad} heuristics violate confidence/counter bounds"));
            }
        }

        // Invariant: domain counts match the active population
        let mut rows = conn
            .query(
                "SELECT dm.domain, dm.current_count,
                        (SELECT COUNT(*) FROM heuristics h
                         WHERE h.domain = dm.domain AND h.status = 'active') AS actual
                 FROM domain_metadata dm",
                (),
            )
            .await
            .map_err(db_err)?;
        let mut drifted = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let domain: String = row.get(0).map_err(db_err)?;
            let recorded: i64 = row.get(1).map_err(db_err)?;
            let actual: i64 = row.get(2).map_err(db_err)?;
            if recorded != actual {
                drifted.push(format!("{domain}: recorded {recorded}, actual {actual}"));
            }
        }
        if !drifted.is_empty() {
            report.error(format!("Domain counts out of sync: {}", drifted.join("; ")));
        }

        // Invariant: state is derived from the count against the limits
        let mut rows = conn
            .query(
                "SELECT domain, state, current_count, soft_limit, hard_limit
                 FROM domain_metadata
                 WHERE state != CASE
                    WHEN current_count > hard_limit THEN 'critical'
                    WHEN current_count > soft_limit THEN 'overflow'
                    ELSE 'normal'
                 END",
                (),
            )
            .await
            .map_err(db_err)?;
        let mut inconsistent = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let domain: String = row.get(0).map_err(db_err)?;
            let state: String = row.get(1).map_err(db_err)?;
            inconsistent.push(format!("{domain}: state '{state}' does not match its count"));
        }
        if !inconsistent.is_empty() {
            report.error(format!("Domain states out of sync: {}", inconsistent.join("; ")));
        }

        // Invariant: promoted patterns point at auto-distilled heuristics
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM patterns p
                 LEFT JOIN heuristics h ON p.promoted_to_heuristic_id = h.id
                 WHERE p.promoted_to_heuristic_id IS NOT NULL
                   AND (h.id IS NULL OR h.source_type != 'auto_distilled' OR h.source_id != p.id)",
                (),
            )
            .await
            .map_err(db_err)?;
        if let Some(row) = rows.next().await.map_err(db_err)? {
            let broken: i64 = row.get(0).map_err(db_err)?;
            if broken > 0 {
                report.error(format!("{broken} promoted patterns have broken heuristic links"));
            }
        }

        // Invariant: every audit row ends finalized
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM building_queries
                 WHERE completed_at IS NULL AND created_at < ?",
                [to_millis(Utc::now() - Duration::minutes(15))],
            )
            .await
            .map_err(db_err)?;
        if let Some(row) = rows.next().await.map_err(db_err)? {
            let dangling: i64 = row.get(0).map_err(db_err)?;
            report.check("unfinalized_audits", json!(dangling));
            if dangling > 0 {
                report.warning(format!(
                    "{dangling} query audit rows were never finalized"
                ));
            }
        }

        // Ownership: confidence audit deltas must reconcile
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM confidence_updates
                 WHERE ABS((new_confidence - old_confidence) - delta) > 1e-9",
                (),
            )
            .await
            .map_err(db_err)?;
        if let Some(row) = rows.next().await.map_err(db_err)? {
            let bad: i64 = row.get(0).map_err(db_err)?;
            if bad > 0 {
                report.warning(format!(
                    "{bad} confidence updates have inconsistent deltas (writer ownership violation?)"
                ));
            }
        }

        for table in REQUIRED_TABLES {
            if existing.iter().any(|t| t == table) {
                // table names come from the compile-time required list
                let mut rows = conn
                    .query(&format!("SELECT COUNT(*) FROM {table}"), ())
                    .await
                    .map_err(db_err)?;
                if let Some(row) = rows.next().await.map_err(db_err)? {
                    let count: i64 = row.get(0).map_err(db_err)?;
                    report.check(format!("{table}_count"), json!(count));
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elf_core::model::QueryStatus;

    #[tokio::test]
    async fn audit_rows_open_and_finalize() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        let id = storage
            .open_query_audit_row(&AuditOpen {
                query_type: "domain".into(),
                session_id: Some("s1".into()),
                domain: Some("auth".into()),
                limit_requested: Some(10),
                ..AuditOpen::default()
            })
            .await
            .unwrap();

        storage
            .finalize_query_audit_row(
                id,
                &AuditClose {
                    status: Some(QueryStatus::Success),
                    duration_ms: 12,
                    results_returned: Some(3),
                    heuristics_count: 2,
                    learnings_count: 1,
                    ..AuditClose::default()
                },
            )
            .await
            .unwrap();

        let conn = storage.conn().await.unwrap();
        let mut rows = conn
            .query(
                "SELECT status, completed_at, heuristics_count FROM building_queries WHERE id = ?",
                [id],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "success");
        assert!(row.get::<i64>(1).is_ok());
        assert_eq!(row.get::<i64>(2).unwrap(), 2);
    }

    #[tokio::test]
    async fn fresh_store_statistics_are_zero() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        let stats = storage.statistics_row().await.unwrap();
        assert_eq!(stats.total_learnings, 0);
        assert_eq!(stats.total_heuristics, 0);
        assert_eq!(stats.violations_7d, 0);
        assert!(stats.learnings_by_type.is_empty());
        assert!(stats.heuristics_by_domain.is_empty());
    }

    #[tokio::test]
    async fn validation_passes_on_fresh_store() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        let report = storage.validate_database_row().await.unwrap();
        assert!(report.valid, "errors: {:?}", report.errors);
        assert_eq!(report.checks.get("integrity"), Some(&json!("ok")));
    }
}
