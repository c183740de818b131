//! Generic repository for driver CRUD over a fixed set of entities.
//!
//! Every identifier (table, column, ORDER BY direction) must pass the
//! allow-list before any SQL is assembled; anything else is a validation
//! failure. Values are always bound as parameters. Confidence-bearing
//! heuristic columns are excluded from the writable set: those writes
//! belong to the lifecycle engine.

use crate::util::db_err;
use crate::ElfStorage;
use elf_core::error::{Error, Result};
use libsql::params_from_iter;
use serde_json::Value;
use std::collections::BTreeMap;

/// Tables the generic repository may touch.
pub const ALLOWED_TABLES: &[&str] = &[
    "decisions",
    "learnings",
    "experiments",
    "violations",
    "invariants",
    "assumptions",
    "spike_reports",
    "session_summaries",
    "ceo_reviews",
];

/// Columns the generic repository may reference in filters, ORDER BY, and
/// writes.
pub const ALLOWED_COLUMNS: &[&str] = &[
    "id",
    "domain",
    "title",
    "context",
    "decision",
    "options_considered",
    "rationale",
    "created_at",
    "updated_at",
    "type",
    "severity",
    "summary",
    "tags",
    "filepath",
    "status",
    "statement",
    "scope",
    "validation_type",
    "violation_count",
    "rule_id",
    "rule_name",
    "violation_date",
    "description",
    "session_id",
    "acknowledged",
    "name",
    "hypothesis",
    "cycles_run",
    "folder_path",
    "recommendation",
    "reviewed_at",
    "assumption",
    "source",
    "confidence",
    "verified_count",
    "challenged_count",
    "last_verified_at",
    "last_validated_at",
    "last_violated_at",
    "superseded_by",
    "topic",
    "question",
    "findings",
    "usefulness_score",
    "access_count",
    "project",
    "tool_summary",
    "content_summary",
    "conversation_summary",
    "files_touched",
    "message_count",
    "summarized_at",
];

/// A table name that has passed the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityTable(&'static str);

impl EntityTable {
    /// Validate a caller-supplied table name against the allow-list.
    pub fn parse(name: &str) -> Result<Self> {
        ALLOWED_TABLES
            .iter()
            .find(|t| **t == name)
            .map(|t| Self(t))
            .ok_or_else(|| Error::Validation(format!("Invalid table: {name}")))
    }

    pub fn name(self) -> &'static str {
        self.0
    }
}

fn validate_column(name: &str) -> Result<&'static str> {
    ALLOWED_COLUMNS
        .iter()
        .find(|c| **c == name)
        .copied()
        .ok_or_else(|| Error::Validation(format!("Invalid column: {name}")))
}

/// Validate `column [ASC|DESC]`.
fn validate_order_by(order_by: &str) -> Result<String> {
    let parts: Vec<&str> = order_by.split_whitespace().collect();
    let (column, direction) = match parts.as_slice() {
        [column] => (*column, "ASC"),
        [column, direction] => (*column, *direction),
        _ => return Err(Error::Validation(format!("Invalid ORDER BY clause: {order_by}"))),
    };
    let column = validate_column(column)?;
    let direction = match direction.to_ascii_uppercase().as_str() {
        "ASC" => "ASC",
        "DESC" => "DESC",
        other => {
            return Err(Error::Validation(format!("Invalid direction in ORDER BY: {other}")));
        }
    };
    Ok(format!("{column} {direction}"))
}

fn bind_value(value: &Value) -> Result<libsql::Value> {
    Ok(match value {
        Value::Null => libsql::Value::Null,
        Value::Bool(b) => libsql::Value::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                libsql::Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                libsql::Value::Real(f)
            } else {
                return Err(Error::Validation(format!("Unsupported numeric value: {n}")));
            }
        }
        Value::String(s) => libsql::Value::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => {
            libsql::Value::Text(serde_json::to_string(value)?)
        }
    })
}

fn row_to_map(row: &libsql::Row) -> Result<BTreeMap<String, Value>> {
    let mut map = BTreeMap::new();
    for i in 0..row.column_count() {
        let name = row.column_name(i).unwrap_or_default().to_string();
        let value = match row.get_value(i).map_err(db_err)? {
            libsql::Value::Null => Value::Null,
            libsql::Value::Integer(n) => Value::from(n),
            libsql::Value::Real(f) => Value::from(f),
            libsql::Value::Text(s) => Value::String(s),
            libsql::Value::Blob(_) => Value::Null,
        };
        map.insert(name, value);
    }
    Ok(map)
}

/// Generic allow-listed CRUD over the storage backend.
pub struct Repository<'a> {
    storage: &'a ElfStorage,
}

impl<'a> Repository<'a> {
    pub fn new(storage: &'a ElfStorage) -> Self {
        Self { storage }
    }

    pub async fn get_by_id(
        &self,
        table: EntityTable,
        id: i64,
    ) -> Result<Option<BTreeMap<String, Value>>> {
        let conn = self.storage.conn().await?;
        let sql = format!("SELECT * FROM {} WHERE id = ?", table.name());
        let mut rows = conn.query(&sql, [id]).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_map(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_all(
        &self,
        table: EntityTable,
        order_by: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BTreeMap<String, Value>>> {
        let order = match order_by {
            Some(order_by) => validate_order_by(order_by)?,
            None => "id ASC".to_string(),
        };
        let conn = self.storage.conn().await?;
        let sql =
            format!("SELECT * FROM {} ORDER BY {order} LIMIT ? OFFSET ?", table.name());
        let mut rows = conn.query(&sql, [limit, offset]).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_map(&row)?);
        }
        Ok(out)
    }

    pub async fn list_with_filters(
        &self,
        table: EntityTable,
        filters: &BTreeMap<String, Value>,
        order_by: Option<&str>,
        limit: i64,
    ) -> Result<Vec<BTreeMap<String, Value>>> {
        let mut clauses = Vec::with_capacity(filters.len());
        let mut bound = Vec::with_capacity(filters.len() + 1);
        for (column, value) in filters {
            let column = validate_column(column)?;
            clauses.push(format!("{column} = ?"));
            bound.push(bind_value(value)?);
        }
        let where_clause =
            if clauses.is_empty() { "1=1".to_string() } else { clauses.join(" AND ") };
        let order = match order_by {
            Some(order_by) => validate_order_by(order_by)?,
            None => "id ASC".to_string(),
        };
        bound.push(libsql::Value::Integer(limit));

        let conn = self.storage.conn().await?;
        let sql = format!(
            "SELECT * FROM {} WHERE {where_clause} ORDER BY {order} LIMIT ?",
            table.name()
        );
        let mut rows = conn.query(&sql, params_from_iter(bound)).await.map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            out.push(row_to_map(&row)?);
        }
        Ok(out)
    }

    pub async fn create(&self, table: EntityTable, values: &BTreeMap<String, Value>) -> Result<i64> {
        if values.is_empty() {
            return Err(Error::Validation("Cannot create a row with no columns".into()));
        }
        let mut columns = Vec::with_capacity(values.len());
        let mut bound = Vec::with_capacity(values.len());
        for (column, value) in values {
            columns.push(validate_column(column)?);
            bound.push(bind_value(value)?);
        }
        let placeholders = vec!["?"; columns.len()].join(", ");

        let conn = self.storage.conn().await?;
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            table.name(),
            columns.join(", ")
        );
        conn.execute(&sql, params_from_iter(bound)).await.map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn update(
        &self,
        table: EntityTable,
        id: i64,
        values: &BTreeMap<String, Value>,
    ) -> Result<bool> {
        if values.is_empty() {
            return Err(Error::Validation("Cannot update a row with no columns".into()));
        }
        let mut assignments = Vec::with_capacity(values.len());
        let mut bound = Vec::with_capacity(values.len() + 1);
        for (column, value) in values {
            let column = validate_column(column)?;
            assignments.push(format!("{column} = ?"));
            bound.push(bind_value(value)?);
        }
        bound.push(libsql::Value::Integer(id));

        let conn = self.storage.conn().await?;
        let sql =
            format!("UPDATE {} SET {} WHERE id = ?", table.name(), assignments.join(", "));
        let changed = conn.execute(&sql, params_from_iter(bound)).await.map_err(db_err)?;
        Ok(changed > 0)
    }

    pub async fn delete(&self, table: EntityTable, id: i64) -> Result<bool> {
        let conn = self.storage.conn().await?;
        let sql = format!("DELETE FROM {} WHERE id = ?", table.name());
        let changed = conn.execute(&sql, [id]).await.map_err(db_err)?;
        Ok(changed > 0)
    }

    pub async fn exists(&self, table: EntityTable, id: i64) -> Result<bool> {
        let conn = self.storage.conn().await?;
        let sql = format!("SELECT 1 FROM {} WHERE id = ? LIMIT 1", table.name());
        let mut rows = conn.query(&sql, [id]).await.map_err(db_err)?;
        Ok(rows.next().await.map_err(db_err)?.is_some())
    }

    pub async fn count(&self, table: EntityTable) -> Result<i64> {
        let conn = self.storage.conn().await?;
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let mut rows = conn.query(&sql, ()).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => row.get(0).map_err(db_err),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tables_are_rejected_before_sql() {
        assert!(EntityTable::parse("decisions").is_ok());
        assert!(EntityTable::parse("heuristics").is_err());
        assert!(EntityTable::parse("decisions; DROP TABLE learnings").is_err());
    }

    #[test]
    fn order_by_is_allow_listed() {
        assert_eq!(validate_order_by("created_at DESC").unwrap(), "created_at DESC");
        assert_eq!(validate_order_by("title").unwrap(), "title ASC");
        assert_eq!(validate_order_by("title desc").unwrap(), "title DESC");
        assert!(validate_order_by("created_at; --").is_err());
        assert!(validate_order_by("created_at SIDEWAYS").is_err());
        assert!(validate_order_by("evil_column ASC").is_err());
    }

    #[tokio::test]
    async fn crud_round_trip_on_decisions() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        let repo = Repository::new(&storage);
        let table = EntityTable::parse("decisions").unwrap();

        let now = chrono::Utc::now().timestamp_millis();
        let mut values = BTreeMap::new();
        values.insert("title".to_string(), Value::from("Use JWT for auth"));
        values.insert("context".to_string(), Value::from("Need stateless sessions"));
        values.insert("decision".to_string(), Value::from("JWT with short expiry"));
        values.insert("rationale".to_string(), Value::from("No shared session store"));
        values.insert("status".to_string(), Value::from("accepted"));
        values.insert("created_at".to_string(), Value::from(now));
        values.insert("updated_at".to_string(), Value::from(now));

        let id = repo.create(table, &values).await.unwrap();
        assert!(repo.exists(table, id).await.unwrap());
        assert_eq!(repo.count(table).await.unwrap(), 1);

        let row = repo.get_by_id(table, id).await.unwrap().unwrap();
        assert_eq!(row.get("title"), Some(&Value::from("Use JWT for auth")));

        let mut patch = BTreeMap::new();
        patch.insert("status".to_string(), Value::from("superseded"));
        assert!(repo.update(table, id, &patch).await.unwrap());

        let mut filters = BTreeMap::new();
        filters.insert("status".to_string(), Value::from("superseded"));
        let rows = repo.list_with_filters(table, &filters, None, 10).await.unwrap();
        assert_eq!(rows.len(), 1);

        assert!(repo.delete(table, id).await.unwrap());
        assert!(!repo.exists(table, id).await.unwrap());
    }

    #[tokio::test]
    async fn filters_on_unknown_columns_fail() {
        let (storage, _dir) = crate::test_support::test_storage().await;
        let repo = Repository::new(&storage);
        let table = EntityTable::parse("decisions").unwrap();
        let mut filters = BTreeMap::new();
        filters.insert("1=1; DROP TABLE decisions".to_string(), Value::from("x"));
        assert!(repo.list_with_filters(table, &filters, None, 10).await.is_err());
    }
}
