//! Metric observations, hourly rollups, meta-alerts, and per-metric
//! configuration.

use crate::util::{db_err, from_millis, opt_from_millis, parse_json, to_millis};
use crate::ElfStorage;
use chrono::{DateTime, Utc};
use elf_core::error::{Error, Result};
use elf_core::model::{AlertSeverity, AlertState, MetaAlert, MetricConfig, MetricObservation};
use libsql::params;

const ALERT_COLUMNS: &str = "id, alert_type, severity, state, metric_name, current_value, baseline_value, \
     message, context, first_seen, last_seen, acknowledged_at, resolved_at";

fn row_to_alert(row: &libsql::Row) -> Result<MetaAlert> {
    let severity_text: String = row.get(2).map_err(db_err)?;
    let state_text: String = row.get(3).map_err(db_err)?;
    Ok(MetaAlert {
        id: row.get(0).map_err(db_err)?,
        alert_type: row.get(1).map_err(db_err)?,
        severity: AlertSeverity::parse(&severity_text)
            .ok_or_else(|| Error::Database(format!("Unknown severity: {severity_text}")))?,
        state: AlertState::parse(&state_text)
            .ok_or_else(|| Error::Database(format!("Unknown alert state: {state_text}")))?,
        metric_name: row.get(4).ok(),
        current_value: row.get(5).ok(),
        baseline_value: row.get(6).ok(),
        message: row.get(7).map_err(db_err)?,
        context: parse_json(row.get(8).ok()),
        first_seen: from_millis(row.get(9).map_err(db_err)?),
        last_seen: from_millis(row.get(10).map_err(db_err)?),
        acknowledged_at: opt_from_millis(row.get(11).ok()),
        resolved_at: opt_from_millis(row.get(12).ok()),
    })
}

fn row_to_metric_config(row: &libsql::Row) -> Result<MetricConfig> {
    Ok(MetricConfig {
        metric_name: row.get(0).map_err(db_err)?,
        z_score_threshold: row.get(1).map_err(db_err)?,
        trend_window_hours: row.get(2).map_err(db_err)?,
        trend_sensitivity: row.get(3).map_err(db_err)?,
        baseline_window_hours: row.get(4).map_err(db_err)?,
        false_positive_count: row.get(5).map_err(db_err)?,
        true_positive_count: row.get(6).map_err(db_err)?,
    })
}

const METRIC_CONFIG_COLUMNS: &str = "metric_name, z_score_threshold, trend_window_hours, trend_sensitivity, \
     baseline_window_hours, false_positive_count, true_positive_count";

impl ElfStorage {
    pub(crate) async fn insert_metric_row(
        &self,
        metric_name: &str,
        value: f64,
        observed_at: DateTime<Utc>,
        domain: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<i64> {
        let conn = self.conn().await?;
        let metadata_json = metadata.map(serde_json::Value::to_string);
        conn.execute(
            "INSERT INTO metric_observations (metric_name, value, observed_at, domain, metadata)
             VALUES (?, ?, ?, ?, ?)",
            params![metric_name, value, to_millis(observed_at), domain, metadata_json],
        )
        .await
        .map_err(|e| Error::Database(format!("Failed to record metric: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) async fn metric_window_rows(
        &self,
        metric_name: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        domain: Option<&str>,
    ) -> Result<Vec<MetricObservation>> {
        let conn = self.conn().await?;
        let mut sql = String::from(
            "SELECT id, metric_name, value, observed_at, domain, metadata
             FROM metric_observations
             WHERE metric_name = ? AND observed_at >= ? AND observed_at <= ?",
        );
        let mut bound: Vec<libsql::Value> = vec![
            libsql::Value::Text(metric_name.to_string()),
            libsql::Value::Integer(to_millis(from)),
            libsql::Value::Integer(to_millis(to)),
        ];
        if let Some(domain) = domain {
            sql.push_str(" AND domain = ?");
            bound.push(libsql::Value::Text(domain.to_string()));
        }
        sql.push_str(" ORDER BY observed_at ASC");

        let mut rows =
            conn.query(&sql, libsql::params_from_iter(bound)).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(MetricObservation {
                id: row.get(0).map_err(db_err)?,
                metric_name: row.get(1).map_err(db_err)?,
                value: row.get(2).map_err(db_err)?,
                observed_at: from_millis(row.get(3).map_err(db_err)?),
                domain: row.get(4).ok(),
                metadata: parse_json(row.get(5).ok()),
            });
        }
        Ok(out)
    }

    pub(crate) async fn earliest_observation_row(
        &self,
        metric_name: &str,
        domain: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn().await?;
        let (sql, bound): (&str, Vec<libsql::Value>) = match domain {
            Some(domain) => (
                "SELECT MIN(observed_at) FROM metric_observations WHERE metric_name = ? AND domain = ?",
                vec![
                    libsql::Value::Text(metric_name.to_string()),
                    libsql::Value::Text(domain.to_string()),
                ],
            ),
            None => (
                "SELECT MIN(observed_at) FROM metric_observations WHERE metric_name = ?",
                vec![libsql::Value::Text(metric_name.to_string())],
            ),
        };
        let mut rows =
            conn.query(sql, libsql::params_from_iter(bound)).await.map_err(db_err)?;
        if let Some(row) = rows.next().await.map_err(db_err)? {
            let earliest: Option<i64> = row.get(0).ok();
            return Ok(earliest.map(from_millis));
        }
        Ok(None)
    }

    pub(crate) async fn list_metric_name_rows(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT DISTINCT metric_name FROM metric_observations WHERE observed_at >= ?",
                [to_millis(since)],
            )
            .await
            .map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row.get(0).map_err(db_err)?);
        }
        Ok(out)
    }

    /// Recompute hourly rollups covering observations at or after `since`.
    pub(crate) async fn refresh_hourly_rollup_rows(&self, since: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn().await?;
        let changed = conn
            .execute(
                "INSERT OR REPLACE INTO metric_hourly_rollups
                    (metric_name, hour_start, domain, min_value, max_value, avg_value, sample_count)
                 SELECT
                    metric_name,
                    (observed_at / 3600000) * 3600000 AS hour_start,
                    domain,
                    MIN(value), MAX(value), AVG(value), COUNT(*)
                 FROM metric_observations
                 WHERE observed_at >= ?
                 GROUP BY metric_name, hour_start, IFNULL(domain, '')",
                [to_millis(since)],
            )
            .await
            .map_err(db_err)?;
        Ok(changed)
    }

    pub(crate) async fn find_unresolved_alert_row(
        &self,
        alert_type: &str,
        metric_name: Option<&str>,
    ) -> Result<Option<MetaAlert>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM meta_alerts
             WHERE alert_type = ? AND IFNULL(metric_name, '') = ? AND state != 'resolved'
             ORDER BY first_seen DESC LIMIT 1"
        );
        let mut rows = conn
            .query(&sql, params![alert_type, metric_name.unwrap_or("")])
            .await
            .map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_alert(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn insert_alert_row(
        &self,
        alert_type: &str,
        severity: AlertSeverity,
        metric_name: Option<&str>,
        current_value: Option<f64>,
        baseline_value: Option<f64>,
        message: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<MetaAlert> {
        let conn = self.conn().await?;
        let now = to_millis(Utc::now());
        conn.execute(
            "INSERT INTO meta_alerts
                (alert_type, severity, state, metric_name, current_value, baseline_value,
                 message, context, first_seen, last_seen)
             VALUES (?, ?, 'new', ?, ?, ?, ?, ?, ?, ?)",
            params![
                alert_type,
                severity.as_str(),
                metric_name,
                current_value,
                baseline_value,
                message,
                context.map(serde_json::Value::to_string),
                now,
                now,
            ],
        )
        .await
        .map_err(db_err)?;
        let id = conn.last_insert_rowid();
        self.get_alert_row(id)
            .await?
            .ok_or_else(|| Error::Internal(format!("inserted alert {id} not found")))
    }

    pub(crate) async fn touch_alert_row(&self, alert_id: i64, message: &str) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE meta_alerts SET last_seen = ?, message = ? WHERE id = ?",
            params![to_millis(Utc::now()), message, alert_id],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Allowed transitions: `new|active -> ack`, any non-terminal ->
    /// `resolved`, `new -> active`.
    pub(crate) async fn set_alert_state_row(
        &self,
        alert_id: i64,
        state: AlertState,
    ) -> Result<bool> {
        let conn = self.conn().await?;
        let now = to_millis(Utc::now());
        let changed = match state {
            AlertState::Ack => {
                conn.execute(
                    "UPDATE meta_alerts SET state = 'ack', acknowledged_at = ?
                     WHERE id = ? AND state IN ('new', 'active')",
                    params![now, alert_id],
                )
                .await
                .map_err(db_err)?
            }
            AlertState::Resolved => {
                conn.execute(
                    "UPDATE meta_alerts SET state = 'resolved', resolved_at = ?
                     WHERE id = ? AND state != 'resolved'",
                    params![now, alert_id],
                )
                .await
                .map_err(db_err)?
            }
            AlertState::Active => {
                conn.execute(
                    "UPDATE meta_alerts SET state = 'active' WHERE id = ? AND state = 'new'",
                    params![alert_id],
                )
                .await
                .map_err(db_err)?
            }
            AlertState::New => {
                return Err(Error::Validation("alerts cannot transition back to 'new'".into()));
            }
        };
        Ok(changed > 0)
    }

    pub(crate) async fn get_alert_row(&self, alert_id: i64) -> Result<Option<MetaAlert>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {ALERT_COLUMNS} FROM meta_alerts WHERE id = ?");
        let mut rows = conn.query(&sql, [alert_id]).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_alert(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn list_active_alert_rows(
        &self,
        severity: Option<AlertSeverity>,
    ) -> Result<Vec<MetaAlert>> {
        let conn = self.conn().await?;
        let mut sql = format!(
            "SELECT {ALERT_COLUMNS} FROM meta_alerts WHERE state IN ('new', 'active', 'ack')"
        );
        let mut bound: Vec<libsql::Value> = Vec::new();
        if let Some(severity) = severity {
            sql.push_str(" AND severity = ?");
            bound.push(libsql::Value::Text(severity.as_str().to_string()));
        }
        sql.push_str(" ORDER BY first_seen DESC");
        let mut rows =
            conn.query(&sql, libsql::params_from_iter(bound)).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_alert(&row)?);
        }
        Ok(out)
    }

    pub(crate) async fn ensure_metric_config_row(
        &self,
        metric_name: &str,
    ) -> Result<MetricConfig> {
        let conn = self.conn().await?;
        let now = to_millis(Utc::now());
        conn.execute(
            "INSERT OR IGNORE INTO meta_observer_config (metric_name, created_at, updated_at)
             VALUES (?, ?, ?)",
            params![metric_name, now, now],
        )
        .await
        .map_err(db_err)?;

        let sql = format!(
            "SELECT {METRIC_CONFIG_COLUMNS} FROM meta_observer_config WHERE metric_name = ?"
        );
        let mut rows = conn.query(&sql, [metric_name]).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => row_to_metric_config(&row),
            None => Err(Error::Internal(format!("metric config for {metric_name} not found"))),
        }
    }

    pub(crate) async fn record_alert_outcome_row(
        &self,
        metric_name: &str,
        is_true_positive: bool,
    ) -> Result<()> {
        self.ensure_metric_config_row(metric_name).await?;
        let conn = self.conn().await?;
        let column = if is_true_positive { "true_positive_count" } else { "false_positive_count" };
        // column name comes from the boolean above, never from callers
        let sql = format!(
            "UPDATE meta_observer_config SET {column} = {column} + 1, updated_at = ?
             WHERE metric_name = ?"
        );
        conn.execute(&sql, params![to_millis(Utc::now()), metric_name])
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub(crate) async fn list_metric_config_rows(&self) -> Result<Vec<MetricConfig>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {METRIC_CONFIG_COLUMNS} FROM meta_observer_config ORDER BY metric_name"
        );
        let mut rows = conn.query(&sql, ()).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_metric_config(&row)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn duplicate_observation_violates_uniqueness() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        let ts = Utc::now();
        storage.insert_metric_row("avg_confidence", 0.7, ts, None, None).await.unwrap();
        let err =
            storage.insert_metric_row("avg_confidence", 0.8, ts, None, None).await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));

        // Same instant in a different domain is a different series
        storage
            .insert_metric_row("avg_confidence", 0.8, ts, Some("auth"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn window_is_ordered_and_bounded() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        let now = Utc::now();
        for (offset_hours, value) in [(50i64, 1.0), (26, 2.0), (12, 3.0), (1, 4.0)] {
            storage
                .insert_metric_row("m", value, now - Duration::hours(offset_hours), None, None)
                .await
                .unwrap();
        }
        let window = storage
            .metric_window_rows("m", now - Duration::hours(24), now, None)
            .await
            .unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].value, 3.0);
        assert_eq!(window[1].value, 4.0);
    }

    #[tokio::test]
    async fn alert_dedup_and_state_machine() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        let alert = storage
            .insert_alert_row(
                "confidence_decline",
                AlertSeverity::Warning,
                Some("avg_confidence"),
                None,
                None,
                "declining",
                None,
            )
            .await
            .unwrap();
        assert_eq!(alert.state, AlertState::New);

        let found = storage
            .find_unresolved_alert_row("confidence_decline", Some("avg_confidence"))
            .await
            .unwrap();
        assert_eq!(found.map(|a| a.id), Some(alert.id));

        assert!(storage.set_alert_state_row(alert.id, AlertState::Ack).await.unwrap());
        // ack -> ack is not a valid transition
        assert!(!storage.set_alert_state_row(alert.id, AlertState::Ack).await.unwrap());
        assert!(storage.set_alert_state_row(alert.id, AlertState::Resolved).await.unwrap());
        // resolved is terminal
        assert!(!storage.set_alert_state_row(alert.id, AlertState::Resolved).await.unwrap());

        // Resolved alerts leave the dedup key free
        let after = storage
            .find_unresolved_alert_row("confidence_decline", Some("avg_confidence"))
            .await
            .unwrap();
        assert!(after.is_none());
    }

    #[tokio::test]
    async fn rollups_aggregate_per_hour() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        let base = Utc::now() - Duration::hours(1);
        for i in 0..4 {
            storage
                .insert_metric_row("m", f64::from(i), base + Duration::minutes(i64::from(i)), None, None)
                .await
                .unwrap();
        }
        let written = storage
            .refresh_hourly_rollup_rows(base - Duration::hours(1))
            .await
            .unwrap();
        assert!(written >= 1);
    }

    #[tokio::test]
    async fn metric_config_outcome_counters() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        storage.record_alert_outcome_row("avg_confidence", false).await.unwrap();
        storage.record_alert_outcome_row("avg_confidence", true).await.unwrap();
        storage.record_alert_outcome_row("avg_confidence", false).await.unwrap();

        let configs = storage.list_metric_config_rows().await.unwrap();
        let config =
            configs.iter().find(|c| c.metric_name == "avg_confidence").unwrap();
        assert_eq!(config.false_positive_count, 2);
        assert_eq!(config.true_positive_count, 1);
    }
}
