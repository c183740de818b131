//! Fraud reports, anomaly signals, responses, baselines, and the privacy
//! store for session contexts.

use crate::util::{db_err, from_millis, parse_json, to_millis};
use crate::ElfStorage;
use chrono::{DateTime, Utc};
use elf_core::error::{Error, Result};
use elf_core::model::{
    AnomalySignal, DomainBaseline, FraudClassification, FraudReport, SignalSeverity,
};
use libsql::params;
use tracing::debug;

impl ElfStorage {
    pub(crate) async fn get_domain_baseline_row(
        &self,
        domain: &str,
    ) -> Result<Option<DomainBaseline>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT domain, avg_success_rate, std_success_rate,
                        avg_update_frequency, std_update_frequency, sample_count, last_updated
                 FROM domain_baselines WHERE domain = ?",
                [domain],
            )
            .await
            .map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(DomainBaseline {
                domain: row.get(0).map_err(db_err)?,
                avg_success_rate: row.get(1).map_err(db_err)?,
                std_success_rate: row.get(2).map_err(db_err)?,
                avg_update_frequency: row.get(3).map_err(db_err)?,
                std_update_frequency: row.get(4).map_err(db_err)?,
                sample_count: row.get(5).map_err(db_err)?,
                last_updated: from_millis(row.get(6).map_err(db_err)?),
            })),
            None => Ok(None),
        }
    }

    /// Replace the current baseline and append a drift-aware history
    /// snapshot in one transaction.
    pub(crate) async fn upsert_domain_baseline_row(
        &self,
        baseline: &DomainBaseline,
    ) -> Result<()> {
        let previous = self.get_domain_baseline_row(&baseline.domain).await?;
        let conn = self.conn().await?;
        let now = to_millis(Utc::now());

        let (prev_avg, prev_std, drift, significant) = match &previous {
            Some(prev) => {
                let drift = if prev.avg_success_rate.abs() > f64::EPSILON {
                    ((baseline.avg_success_rate - prev.avg_success_rate)
                        / prev.avg_success_rate)
                        * 100.0
                } else {
                    0.0
                };
                (
                    Some(prev.avg_success_rate),
                    Some(prev.std_success_rate),
                    Some(drift),
                    drift.abs() > 10.0,
                )
            }
            None => (None, None, None, false),
        };

        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(db_err)?;
        let result: Result<()> = async {
            conn.execute(
                "INSERT OR REPLACE INTO domain_baselines
                    (domain, avg_success_rate, std_success_rate,
                     avg_update_frequency, std_update_frequency, sample_count, last_updated)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    baseline.domain.clone(),
                    baseline.avg_success_rate,
                    baseline.std_success_rate,
                    baseline.avg_update_frequency,
                    baseline.std_update_frequency,
                    baseline.sample_count,
                    now,
                ],
            )
            .await
            .map_err(db_err)?;

            conn.execute(
                "INSERT INTO domain_baseline_history
                    (domain, avg_success_rate, std_success_rate,
                     avg_update_frequency, std_update_frequency, sample_count,
                     prev_avg_success_rate, prev_std_success_rate,
                     drift_percentage, is_significant_drift, calculated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    baseline.domain.clone(),
                    baseline.avg_success_rate,
                    baseline.std_success_rate,
                    baseline.avg_update_frequency,
                    baseline.std_update_frequency,
                    baseline.sample_count,
                    prev_avg,
                    prev_std,
                    drift,
                    i64::from(significant),
                    now,
                ],
            )
            .await
            .map_err(db_err)?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                conn.execute("COMMIT", ()).await.map_err(db_err)?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    /// Updates-per-day for each active heuristic in a domain with history.
    pub(crate) async fn domain_update_frequency_rows(&self, domain: &str) -> Result<Vec<f64>> {
        let conn = self.conn().await?;
        let now_ms = to_millis(Utc::now());
        let mut rows = conn
            .query(
                "SELECT COUNT(cu.id) AS update_count,
                        (? - MIN(cu.created_at)) / 86400000.0 AS days_active
                 FROM heuristics h
                 JOIN confidence_updates cu ON h.id = cu.heuristic_id
                 WHERE h.domain = ? AND h.status = 'active'
                 GROUP BY h.id
                 HAVING days_active > 0",
                params![now_ms, domain],
            )
            .await
            .map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let count: i64 = row.get(0).map_err(db_err)?;
            let days: f64 = row.get(1).map_err(db_err)?;
            out.push(count as f64 / days.max(1.0));
        }
        Ok(out)
    }

    /// Persist report + signals, bump `fraud_flags`, and stamp
    /// `last_fraud_check` in one transaction.
    pub(crate) async fn insert_fraud_report_row(
        &self,
        heuristic_id: i64,
        fraud_score: f64,
        classification: FraudClassification,
        likelihood_ratio: f64,
        signals: &[AnomalySignal],
    ) -> Result<FraudReport> {
        let conn = self.conn().await?;
        let now = to_millis(Utc::now());

        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(db_err)?;
        let result: Result<i64> = async {
            conn.execute(
                "INSERT INTO fraud_reports
                    (heuristic_id, fraud_score, classification, likelihood_ratio, signal_count, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    heuristic_id,
                    fraud_score,
                    classification.as_str(),
                    likelihood_ratio,
                    signals.len() as i64,
                    now,
                ],
            )
            .await
            .map_err(db_err)?;
            let report_id = conn.last_insert_rowid();

            for signal in signals {
                conn.execute(
                    "INSERT INTO anomaly_signals
                        (fraud_report_id, heuristic_id, detector_name, score, severity, reason, evidence, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        report_id,
                        heuristic_id,
                        signal.detector_name.clone(),
                        signal.score,
                        signal.severity.as_str(),
                        signal.reason.clone(),
                        signal.evidence.to_string(),
                        now,
                    ],
                )
                .await
                .map_err(db_err)?;
            }

            conn.execute(
                "UPDATE heuristics SET fraud_flags = fraud_flags + 1, last_fraud_check = ?, updated_at = ?
                 WHERE id = ?",
                params![now, now, heuristic_id],
            )
            .await
            .map_err(db_err)?;
            Ok(report_id)
        }
        .await;

        match result {
            Ok(report_id) => {
                conn.execute("COMMIT", ()).await.map_err(db_err)?;
                debug!(heuristic_id, report_id, classification = classification.as_str(), "Stored fraud report");
                Ok(FraudReport {
                    id: report_id,
                    heuristic_id,
                    fraud_score,
                    classification,
                    likelihood_ratio,
                    signals: signals.to_vec(),
                    created_at: from_millis(now),
                })
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    pub(crate) async fn insert_fraud_response_row(
        &self,
        fraud_report_id: i64,
        response_type: &str,
        parameters: &serde_json::Value,
    ) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO fraud_responses (fraud_report_id, response_type, parameters, executed_at, executed_by)
             VALUES (?, ?, ?, ?, 'system')",
            params![
                fraud_report_id,
                response_type,
                parameters.to_string(),
                to_millis(Utc::now()),
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub(crate) async fn stamp_fraud_check_row(&self, heuristic_id: i64) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE heuristics SET last_fraud_check = ? WHERE id = ?",
            params![to_millis(Utc::now()), heuristic_id],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub(crate) async fn insert_session_context_row(
        &self,
        session_id: &str,
        agent_id: Option<&str>,
        context_hash: &str,
        context_preview: &str,
        heuristics_applied: &[i64],
    ) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO session_contexts
                (session_id, agent_id, context_hash, context_preview, heuristics_applied, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                session_id,
                agent_id,
                context_hash,
                context_preview,
                serde_json::to_string(heuristics_applied)?,
                to_millis(Utc::now()),
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub(crate) async fn purge_session_context_rows(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let conn = self.conn().await?;
        let purged = conn
            .execute("DELETE FROM session_contexts WHERE created_at < ?", [to_millis(cutoff)])
            .await
            .map_err(db_err)?;
        Ok(purged)
    }

    /// Signals for a stored report (reloading a report's detail).
    #[allow(dead_code)]
    pub(crate) async fn list_signal_rows(&self, report_id: i64) -> Result<Vec<AnomalySignal>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT detector_name, score, severity, reason, evidence
                 FROM anomaly_signals WHERE fraud_report_id = ? ORDER BY id",
                [report_id],
            )
            .await
            .map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let severity_text: String = row.get(2).map_err(db_err)?;
            out.push(AnomalySignal {
                detector_name: row.get(0).map_err(db_err)?,
                score: row.get(1).map_err(db_err)?,
                severity: SignalSeverity::parse(&severity_text).ok_or_else(|| {
                    Error::Database(format!("Unknown signal severity: {severity_text}"))
                })?,
                reason: row.get(3).map_err(db_err)?,
                evidence: parse_json(row.get(4).ok()).unwrap_or(serde_json::Value::Null),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn baseline(domain: &str, avg: f64) -> DomainBaseline {
        DomainBaseline {
            domain: domain.to_string(),
            avg_success_rate: avg,
            std_success_rate: 0.05,
            avg_update_frequency: 1.0,
            std_update_frequency: 0.1,
            sample_count: 5,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn baseline_upsert_snapshots_drift() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        storage.upsert_domain_baseline_row(&baseline("auth", 0.60)).await.unwrap();
        storage.upsert_domain_baseline_row(&baseline("auth", 0.72)).await.unwrap();

        let current = storage.get_domain_baseline_row("auth").await.unwrap().unwrap();
        assert!((current.avg_success_rate - 0.72).abs() < 1e-12);

        let conn = storage.conn().await.unwrap();
        let mut rows = conn
            .query(
                "SELECT prev_avg_success_rate, drift_percentage, is_significant_drift
                 FROM domain_baseline_history WHERE domain = 'auth' ORDER BY id DESC LIMIT 1",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let prev: f64 = row.get(0).unwrap();
        let drift: f64 = row.get(1).unwrap();
        let significant: i64 = row.get(2).unwrap();
        assert!((prev - 0.60).abs() < 1e-12);
        assert!((drift - 20.0).abs() < 1e-9);
        assert_eq!(significant, 1);
    }

    #[tokio::test]
    async fn report_persists_signals_and_flags() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        let h = storage
            .insert_heuristic_row(
                &elf_core::model::NewHeuristic {
                    domain: "auth".into(),
                    rule: "Rule under test".into(),
                    explanation: None,
                    source_type: elf_core::model::SourceType::Observation,
                    source_id: None,
                    confidence: 0.9,
                    times_validated: 0,
                    is_golden: false,
                    project_path: None,
                },
                0.3,
                3,
            )
            .await
            .unwrap();

        let signal = AnomalySignal {
            detector_name: "success_rate_anomaly".into(),
            score: 0.9,
            severity: SignalSeverity::High,
            reason: "way above baseline".into(),
            evidence: serde_json::json!({"z_score": 4.5}),
        };
        let report = storage
            .insert_fraud_report_row(h.id, 0.85, FraudClassification::FraudConfirmed, 64.0, &[signal])
            .await
            .unwrap();

        let reloaded_signals = storage.list_signal_rows(report.id).await.unwrap();
        assert_eq!(reloaded_signals.len(), 1);
        assert_eq!(reloaded_signals[0].detector_name, "success_rate_anomaly");

        let reloaded = storage.get_heuristic_row(h.id).await.unwrap().unwrap();
        assert_eq!(reloaded.fraud_flags, 1);
        assert!(reloaded.last_fraud_check.is_some());
    }

    #[tokio::test]
    async fn session_contexts_purge_by_age() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        storage
            .insert_session_context_row("s1", None, "hash", "preview", &[1, 2])
            .await
            .unwrap();
        // Nothing older than a week yet
        let purged = storage
            .purge_session_context_rows(Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(purged, 0);
        // Everything older than the future
        let purged = storage
            .purge_session_context_rows(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
    }
}
