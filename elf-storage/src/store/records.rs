//! Domain metadata, decisions, invariants, violations, and the auxiliary
//! read targets.

use crate::util::{db_err, from_millis, opt_from_millis, to_millis};
use crate::ElfStorage;
use chrono::{Duration, Utc};
use elf_core::error::{Error, Result};
use elf_core::model::{
    Assumption, AssumptionStatus, CeoReview, Decision, DecisionStatus, DomainMetadata,
    DomainState, Experiment, Invariant, InvariantScope, InvariantSeverity, Violation,
    ViolationSummary,
};
use libsql::params;

const DOMAIN_METADATA_COLUMNS: &str = "domain, soft_limit, hard_limit, ceo_override_limit, current_count, state, \
     overflow_entered_at, expansion_min_confidence, expansion_min_validations, \
     expansion_min_novelty, grace_period_days, max_overflow_days, \
     avg_confidence, health_score, created_at, updated_at";

fn row_to_domain_metadata(row: &libsql::Row) -> Result<DomainMetadata> {
    let state_text: String = row.get(5).map_err(db_err)?;
    Ok(DomainMetadata {
        domain: row.get(0).map_err(db_err)?,
        soft_limit: row.get(1).map_err(db_err)?,
        hard_limit: row.get(2).map_err(db_err)?,
        ceo_override_limit: row.get(3).ok(),
        current_count: row.get(4).map_err(db_err)?,
        state: DomainState::parse(&state_text)
            .ok_or_else(|| Error::Database(format!("Unknown domain state: {state_text}")))?,
        overflow_entered_at: opt_from_millis(row.get(6).ok()),
        expansion_min_confidence: row.get(7).map_err(db_err)?,
        expansion_min_validations: row.get(8).map_err(db_err)?,
        expansion_min_novelty: row.get(9).map_err(db_err)?,
        grace_period_days: row.get(10).map_err(db_err)?,
        max_overflow_days: row.get(11).map_err(db_err)?,
        avg_confidence: row.get(12).ok(),
        health_score: row.get(13).ok(),
        created_at: from_millis(row.get(14).map_err(db_err)?),
        updated_at: from_millis(row.get(15).map_err(db_err)?),
    })
}

impl ElfStorage {
    pub(crate) async fn ensure_domain_metadata_row(
        &self,
        domain: &str,
        soft_limit: i64,
        hard_limit: i64,
    ) -> Result<DomainMetadata> {
        let conn = self.conn().await?;
        let now = to_millis(Utc::now());
        conn.execute(
            "INSERT OR IGNORE INTO domain_metadata (domain, soft_limit, hard_limit, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            params![domain, soft_limit, hard_limit, now, now],
        )
        .await
        .map_err(db_err)?;

        self.get_domain_metadata_row(domain)
            .await?
            .ok_or_else(|| Error::Internal(format!("domain metadata for {domain} not found")))
    }

    pub(crate) async fn get_domain_metadata_row(
        &self,
        domain: &str,
    ) -> Result<Option<DomainMetadata>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {DOMAIN_METADATA_COLUMNS} FROM domain_metadata WHERE domain = ?"
        );
        let mut rows = conn.query(&sql, [domain]).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_domain_metadata(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn list_domain_metadata_rows(&self) -> Result<Vec<DomainMetadata>> {
        let conn = self.conn().await?;
        let sql =
            format!("SELECT {DOMAIN_METADATA_COLUMNS} FROM domain_metadata ORDER BY domain");
        let mut rows = conn.query(&sql, ()).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_domain_metadata(&row)?);
        }
        Ok(out)
    }

    pub(crate) async fn update_domain_health_row(
        &self,
        domain: &str,
        avg_confidence: Option<f64>,
        health_score: Option<f64>,
    ) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE domain_metadata SET avg_confidence = ?, health_score = ?, updated_at = ?
             WHERE domain = ?",
            params![avg_confidence, health_score, to_millis(Utc::now()), domain],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub(crate) async fn list_decision_rows(
        &self,
        domain: Option<&str>,
        status: DecisionStatus,
        limit: i64,
    ) -> Result<Vec<Decision>> {
        let conn = self.conn().await?;
        let mut sql = String::from(
            "SELECT id, title, context, options_considered, decision, rationale, domain,
                    status, superseded_by, created_at, updated_at
             FROM decisions WHERE status = ?",
        );
        let mut bound: Vec<libsql::Value> =
            vec![libsql::Value::Text(status.as_str().to_string())];
        if let Some(domain) = domain {
            sql.push_str(" AND domain = ?");
            bound.push(libsql::Value::Text(domain.to_string()));
        }
        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT {limit}"));

        let mut rows =
            conn.query(&sql, libsql::params_from_iter(bound)).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let status_text: String = row.get(7).map_err(db_err)?;
            out.push(Decision {
                id: row.get(0).map_err(db_err)?,
                title: row.get(1).map_err(db_err)?,
                context: row.get(2).map_err(db_err)?,
                options_considered: row.get(3).ok(),
                decision: row.get(4).map_err(db_err)?,
                rationale: row.get(5).map_err(db_err)?,
                domain: row.get(6).ok(),
                status: DecisionStatus::parse(&status_text).ok_or_else(|| {
                    Error::Database(format!("Unknown decision status: {status_text}"))
                })?,
                superseded_by: row.get(8).ok(),
                created_at: from_millis(row.get(9).map_err(db_err)?),
                updated_at: from_millis(row.get(10).map_err(db_err)?),
            });
        }
        Ok(out)
    }

    pub(crate) async fn list_invariant_rows(
        &self,
        domain: Option<&str>,
        status: &str,
        limit: i64,
    ) -> Result<Vec<Invariant>> {
        let conn = self.conn().await?;
        let mut sql = String::from(
            "SELECT id, statement, rationale, domain, scope, validation_type, severity,
                    status, violation_count, last_validated_at, last_violated_at,
                    created_at, updated_at
             FROM invariants WHERE status = ?",
        );
        let mut bound: Vec<libsql::Value> = vec![libsql::Value::Text(status.to_string())];
        if let Some(domain) = domain {
            sql.push_str(" AND domain = ?");
            bound.push(libsql::Value::Text(domain.to_string()));
        }
        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT {limit}"));

        let mut rows =
            conn.query(&sql, libsql::params_from_iter(bound)).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let scope_text: String = row.get(4).map_err(db_err)?;
            let severity_text: String = row.get(6).map_err(db_err)?;
            out.push(Invariant {
                id: row.get(0).map_err(db_err)?,
                statement: row.get(1).map_err(db_err)?,
                rationale: row.get(2).map_err(db_err)?,
                domain: row.get(3).ok(),
                scope: InvariantScope::parse(&scope_text).ok_or_else(|| {
                    Error::Database(format!("Unknown invariant scope: {scope_text}"))
                })?,
                validation_type: row.get(5).ok(),
                severity: InvariantSeverity::parse(&severity_text).ok_or_else(|| {
                    Error::Database(format!("Unknown invariant severity: {severity_text}"))
                })?,
                status: row.get(7).map_err(db_err)?,
                violation_count: row.get(8).map_err(db_err)?,
                last_validated_at: opt_from_millis(row.get(9).ok()),
                last_violated_at: opt_from_millis(row.get(10).ok()),
                created_at: from_millis(row.get(11).map_err(db_err)?),
                updated_at: from_millis(row.get(12).map_err(db_err)?),
            });
        }
        Ok(out)
    }

    pub(crate) async fn list_assumption_rows(
        &self,
        domain: Option<&str>,
        status: AssumptionStatus,
        limit: i64,
    ) -> Result<Vec<Assumption>> {
        let conn = self.conn().await?;
        let mut sql = String::from(
            "SELECT id, assumption, context, source, confidence, status, domain,
                    verified_count, challenged_count, last_verified_at, created_at, updated_at
             FROM assumptions WHERE status = ?",
        );
        let mut bound: Vec<libsql::Value> =
            vec![libsql::Value::Text(status.as_str().to_string())];
        if let Some(domain) = domain {
            sql.push_str(" AND domain = ?");
            bound.push(libsql::Value::Text(domain.to_string()));
        }
        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT {limit}"));

        let mut rows =
            conn.query(&sql, libsql::params_from_iter(bound)).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let status_text: String = row.get(5).map_err(db_err)?;
            out.push(Assumption {
                id: row.get(0).map_err(db_err)?,
                assumption: row.get(1).map_err(db_err)?,
                context: row.get(2).ok(),
                source: row.get(3).ok(),
                confidence: row.get(4).map_err(db_err)?,
                status: AssumptionStatus::parse(&status_text).ok_or_else(|| {
                    Error::Database(format!("Unknown assumption status: {status_text}"))
                })?,
                domain: row.get(6).ok(),
                verified_count: row.get(7).map_err(db_err)?,
                challenged_count: row.get(8).map_err(db_err)?,
                last_verified_at: opt_from_millis(row.get(9).ok()),
                created_at: from_millis(row.get(10).map_err(db_err)?),
                updated_at: from_millis(row.get(11).map_err(db_err)?),
            });
        }
        Ok(out)
    }

    pub(crate) async fn insert_violation_row(
        &self,
        rule_id: i64,
        rule_name: &str,
        description: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<Violation> {
        let conn = self.conn().await?;
        let now = to_millis(Utc::now());
        conn.execute(
            "INSERT INTO violations (rule_id, rule_name, violation_date, description, session_id, acknowledged)
             VALUES (?, ?, ?, ?, ?, 0)",
            params![rule_id, rule_name, now, description, session_id],
        )
        .await
        .map_err(db_err)?;
        Ok(Violation {
            id: conn.last_insert_rowid(),
            rule_id,
            rule_name: rule_name.to_string(),
            violation_date: from_millis(now),
            description: description.map(str::to_string),
            session_id: session_id.map(str::to_string),
            acknowledged: false,
        })
    }

    pub(crate) async fn acknowledge_violation_row(&self, violation_id: i64) -> Result<bool> {
        let conn = self.conn().await?;
        let changed = conn
            .execute(
                "UPDATE violations SET acknowledged = 1 WHERE id = ? AND acknowledged = 0",
                [violation_id],
            )
            .await
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    pub(crate) async fn list_violation_rows(
        &self,
        days: i64,
        acknowledged: Option<bool>,
    ) -> Result<Vec<Violation>> {
        let conn = self.conn().await?;
        let cutoff = to_millis(Utc::now() - Duration::days(days));
        let mut sql = String::from(
            "SELECT id, rule_id, rule_name, violation_date, description, session_id, acknowledged
             FROM violations WHERE violation_date >= ?",
        );
        let mut bound: Vec<libsql::Value> = vec![libsql::Value::Integer(cutoff)];
        if let Some(acknowledged) = acknowledged {
            sql.push_str(" AND acknowledged = ?");
            bound.push(libsql::Value::Integer(i64::from(acknowledged)));
        }
        sql.push_str(" ORDER BY violation_date DESC");

        let mut rows =
            conn.query(&sql, libsql::params_from_iter(bound)).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(Violation {
                id: row.get(0).map_err(db_err)?,
                rule_id: row.get(1).map_err(db_err)?,
                rule_name: row.get(2).map_err(db_err)?,
                violation_date: from_millis(row.get(3).map_err(db_err)?),
                description: row.get(4).ok(),
                session_id: row.get(5).ok(),
                acknowledged: row.get::<i64>(6).map_err(db_err)? != 0,
            });
        }
        Ok(out)
    }

    pub(crate) async fn violation_summary_row(&self, days: i64) -> Result<ViolationSummary> {
        let conn = self.conn().await?;
        let cutoff = to_millis(Utc::now() - Duration::days(days));

        let mut rows = conn
            .query(
                "SELECT COUNT(*), SUM(acknowledged) FROM violations WHERE violation_date >= ?",
                [cutoff],
            )
            .await
            .map_err(db_err)?;
        let (total, acknowledged) = match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let total: i64 = row.get(0).map_err(db_err)?;
                let acknowledged: Option<i64> = row.get(1).ok();
                (total, acknowledged.unwrap_or(0))
            }
            None => (0, 0),
        };

        let mut by_rule = Vec::new();
        let mut rows = conn
            .query(
                "SELECT rule_name, COUNT(*) AS violations FROM violations
                 WHERE violation_date >= ?
                 GROUP BY rule_name ORDER BY violations DESC",
                [cutoff],
            )
            .await
            .map_err(db_err)?;
        while let Some(row) = rows.next().await.map_err(db_err)? {
            by_rule.push((row.get::<String>(0).map_err(db_err)?, row.get::<i64>(1).map_err(db_err)?));
        }

        Ok(ViolationSummary {
            window_days: days,
            total,
            acknowledged,
            unacknowledged: total - acknowledged,
            by_rule,
        })
    }

    pub(crate) async fn list_active_experiment_rows(&self) -> Result<Vec<Experiment>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, hypothesis, status, cycles_run, folder_path, created_at, updated_at
                 FROM experiments WHERE status = 'active' ORDER BY updated_at DESC",
                (),
            )
            .await
            .map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(Experiment {
                id: row.get(0).map_err(db_err)?,
                name: row.get(1).map_err(db_err)?,
                hypothesis: row.get(2).ok(),
                status: row.get(3).map_err(db_err)?,
                cycles_run: row.get(4).map_err(db_err)?,
                folder_path: row.get(5).ok(),
                created_at: from_millis(row.get(6).map_err(db_err)?),
                updated_at: from_millis(row.get(7).map_err(db_err)?),
            });
        }
        Ok(out)
    }

    pub(crate) async fn list_pending_ceo_review_rows(&self) -> Result<Vec<CeoReview>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, title, context, recommendation, status, created_at, reviewed_at
                 FROM ceo_reviews WHERE status = 'pending' ORDER BY created_at ASC",
                (),
            )
            .await
            .map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(CeoReview {
                id: row.get(0).map_err(db_err)?,
                title: row.get(1).map_err(db_err)?,
                context: row.get(2).ok(),
                recommendation: row.get(3).ok(),
                status: row.get(4).map_err(db_err)?,
                created_at: from_millis(row.get(5).map_err(db_err)?),
                reviewed_at: opt_from_millis(row.get(6).ok()),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elf_core::model::{NewHeuristic, SourceType};

    fn candidate(domain: &str, rule: &str) -> NewHeuristic {
        NewHeuristic {
            domain: domain.to_string(),
            rule: rule.to_string(),
            explanation: None,
            source_type: SourceType::Observation,
            source_id: None,
            confidence: 0.8,
            times_validated: 5,
            is_golden: false,
            project_path: None,
        }
    }

    #[tokio::test]
    async fn triggers_keep_domain_counts_in_sync() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        storage.ensure_domain_metadata_row("auth", 2, 4).await.unwrap();

        for i in 0..3 {
            storage
                .insert_heuristic_row(&candidate("auth", &format!("Distinct rule number {i}")), 0.3, 3)
                .await
                .unwrap();
        }

        let meta = storage.get_domain_metadata_row("auth").await.unwrap().unwrap();
        assert_eq!(meta.current_count, 3);
        assert_eq!(meta.state, DomainState::Overflow);
        assert!(meta.overflow_entered_at.is_some());

        // Evicting one brings the domain back under the soft cap
        let candidates = storage.list_eviction_candidate_rows("auth").await.unwrap();
        storage
            .set_heuristic_status_row(
                candidates[0].heuristic_id,
                elf_core::model::HeuristicStatus::Evicted,
                None,
            )
            .await
            .unwrap();

        let meta = storage.get_domain_metadata_row("auth").await.unwrap().unwrap();
        assert_eq!(meta.current_count, 2);
        assert_eq!(meta.state, DomainState::Normal);
        assert!(meta.overflow_entered_at.is_none());
    }

    #[tokio::test]
    async fn violation_summary_counts() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        let v1 = storage.insert_violation_row(1, "no-force-push", None, None).await.unwrap();
        storage.insert_violation_row(1, "no-force-push", None, None).await.unwrap();
        storage.insert_violation_row(2, "tests-first", None, None).await.unwrap();
        storage.acknowledge_violation_row(v1.id).await.unwrap();

        let summary = storage.violation_summary_row(7).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.acknowledged, 1);
        assert_eq!(summary.unacknowledged, 2);
        assert_eq!(summary.by_rule[0], ("no-force-push".to_string(), 2));

        let unacked = storage.list_violation_rows(7, Some(false)).await.unwrap();
        assert_eq!(unacked.len(), 2);
    }
}
