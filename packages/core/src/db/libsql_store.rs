//! Embedded libsql Store
//!
//! Persists every table in a single `records` table of JSON rows:
//!
//! ```sql
//! records(seq INTEGER PRIMARY KEY AUTOINCREMENT,
//!         table_name TEXT, id TEXT, data TEXT,
//!         UNIQUE(table_name, id))
//! ```
//!
//! `seq` preserves insertion order, which `Select` uses for tie-breaking.
//!
//! # Filter pushdown
//!
//! `Eq`, `In`, `IsNull` and `PathPrefix` become `WHERE` terms over
//! `json_extract(data, '$.<column>')`; a path prefix is an equality or a
//! range scan (`>= prefix/` and `< prefix0`) that the expression index on
//! `$.path` serves. The SQL narrows, then the rows returned are checked
//! again with the same predicate code as `MemoryStore`, so both backends
//! agree on every query.
//!
//! # Connection Pattern
//!
//! A fresh connection is opened per operation with a 5 second busy timeout;
//! read-modify-write operations (`update`, `delete`) run inside a
//! transaction so concurrent writers serialize instead of interleaving.

use crate::db::{
    apply_patch, matches_all, prepare_insert, procedures, record_id, ChangeBus, ChangeEvent,
    ChangeFeed, ChangeKind, DataStore, Filter, Record, RemoteProcedure, Select, StoreError,
    Subscription, DEFAULT_EVENT_CAPACITY,
};
use async_trait::async_trait;
use libsql::{Builder, Connection, Database};
use serde_json::Number;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct LibsqlStore {
    db: Arc<Database>,
    db_path: PathBuf,
    bus: ChangeBus,
}

impl LibsqlStore {
    /// Open (or create) the database at `db_path` and initialise the schema
    pub async fn open(db_path: PathBuf) -> Result<Self, StoreError> {
        Self::open_with_capacity(db_path, DEFAULT_EVENT_CAPACITY).await
    }

    pub async fn open_with_capacity(db_path: PathBuf, capacity: usize) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| StoreError::connection_failed(db_path.clone(), e))?;

        let store = Self {
            db: Arc::new(db),
            db_path,
            bus: ChangeBus::new(capacity),
        };
        store.initialize_schema().await?;

        tracing::info!("Opened libsql store at {}", store.db_path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.connect().await?;
        Self::execute_pragma(&conn, "PRAGMA journal_mode = WAL").await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                UNIQUE (table_name, id)
            )",
            (),
        )
        .await?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_table ON records(table_name, seq)",
            (),
        )
        .await?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_path
             ON records(table_name, json_extract(data, '$.path'))",
            (),
        )
        .await?;

        Ok(())
    }

    /// PRAGMA statements return rows, so they go through `query`
    async fn execute_pragma(conn: &Connection, pragma: &str) -> Result<(), StoreError> {
        let mut stmt = conn.prepare(pragma).await?;
        let _ = stmt.query(()).await?;
        Ok(())
    }

    async fn connect(&self) -> Result<Connection, StoreError> {
        let conn = self.db.connect()?;
        Self::execute_pragma(&conn, "PRAGMA busy_timeout = 5000").await?;
        Ok(conn)
    }

    /// Rows of `table` matching `filters`, in insertion order
    async fn load_rows(
        conn: &Connection,
        table: &str,
        filters: &[Filter],
    ) -> Result<Vec<Record>, StoreError> {
        let (clause, mut params) = where_clause(filters);
        params.insert(0, libsql::Value::Text(table.to_string()));
        let sql = format!(
            "SELECT data FROM records WHERE table_name = ?{} ORDER BY seq",
            clause
        );
        let mut rows = conn.query(&sql, libsql::params_from_iter(params)).await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            match serde_json::from_str::<Value>(&data)? {
                Value::Object(map) if matches_all(filters, &map) => records.push(map),
                Value::Object(_) => {}
                other => {
                    tracing::warn!("Skipping non-object row in {}: {}", table, other);
                }
            }
        }
        Ok(records)
    }

    fn require_id(table: &str, record: &Record) -> Result<String, StoreError> {
        record_id(record).map(str::to_string).ok_or_else(|| {
            StoreError::invalid_request(format!("row in {} has no string id", table))
        })
    }
}

#[async_trait]
impl DataStore for LibsqlStore {
    async fn select(&self, table: &str, query: &Select) -> Result<Vec<Record>, StoreError> {
        let conn = self.connect().await?;
        let rows = Self::load_rows(&conn, table, &query.filters).await?;
        Ok(query.apply(rows))
    }

    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError> {
        let record = prepare_insert(record);
        let id = Self::require_id(table, &record)?;
        let data = serde_json::to_string(&record)?;

        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO records (table_name, id, data) VALUES (?, ?, ?)",
            (table, id.as_str(), data.as_str()),
        )
        .await
        .map_err(|e| StoreError::backend(format!("Failed to insert into {}: {}", table, e)))?;

        self.bus
            .publish(ChangeEvent::new(table, ChangeKind::Insert, record.clone()));
        Ok(record)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Record,
    ) -> Result<Vec<Record>, StoreError> {
        let conn = self.connect().await?;
        let tx = conn.transaction().await?;

        let mut updated = Vec::new();
        for mut record in Self::load_rows(&tx, table, filters).await? {
            let previous = record.clone();
            apply_patch(&mut record, &patch);
            let id = Self::require_id(table, &record)?;
            let data = serde_json::to_string(&record)?;
            tx.execute(
                "UPDATE records SET data = ? WHERE table_name = ? AND id = ?",
                (data.as_str(), table, id.as_str()),
            )
            .await?;
            updated.push((previous, record));
        }
        tx.commit().await?;

        let mut rows = Vec::with_capacity(updated.len());
        for (previous, record) in updated {
            self.bus
                .publish(ChangeEvent::updated(table, previous, record.clone()));
            rows.push(record);
        }
        Ok(rows)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        let conn = self.connect().await?;
        let tx = conn.transaction().await?;

        let mut removed = Vec::new();
        for record in Self::load_rows(&tx, table, filters).await? {
            let id = Self::require_id(table, &record)?;
            tx.execute(
                "DELETE FROM records WHERE table_name = ? AND id = ?",
                (table, id.as_str()),
            )
            .await?;
            removed.push(record);
        }
        tx.commit().await?;

        let count = removed.len();
        for record in removed {
            self.bus
                .publish(ChangeEvent::new(table, ChangeKind::Delete, record));
        }
        Ok(count)
    }

    async fn subscribe(&self, subscription: Subscription) -> Result<ChangeFeed, StoreError> {
        Ok(self.bus.subscribe(subscription))
    }

    async fn call(&self, procedure: RemoteProcedure) -> Result<Value, StoreError> {
        procedures::execute(self, &procedure).await
    }
}

/// SQL for the filters that can be pushed down, as ` AND ...` terms with
/// positional parameters
fn where_clause(filters: &[Filter]) -> (String, Vec<libsql::Value>) {
    let mut clause = String::new();
    let mut params = Vec::new();
    for filter in filters {
        match filter {
            Filter::Eq(column, value) => {
                if let (Some(expr), Some(param)) = (column_expr(column), sql_value(value)) {
                    clause.push_str(&format!(" AND {} = ?", expr));
                    params.push(param);
                }
            }
            Filter::In(column, values) => {
                let Some(expr) = column_expr(column) else {
                    continue;
                };
                let bound: Option<Vec<libsql::Value>> = values.iter().map(sql_value).collect();
                match bound {
                    Some(bound) if bound.is_empty() => clause.push_str(" AND 0"),
                    Some(bound) => {
                        let marks = vec!["?"; bound.len()].join(", ");
                        clause.push_str(&format!(" AND {} IN ({})", expr, marks));
                        params.extend(bound);
                    }
                    None => {}
                }
            }
            Filter::IsNull(column) => {
                if let Some(expr) = column_expr(column) {
                    clause.push_str(&format!(" AND {} IS NULL", expr));
                }
            }
            Filter::PathPrefix(column, prefix) => {
                let prefix = prefix.trim_end_matches('/');
                let Some(expr) = column_expr(column) else {
                    continue;
                };
                if prefix.is_empty() {
                    continue;
                }
                // '0' is the code point after '/', so the range holds
                // exactly the paths under `prefix/`
                clause.push_str(&format!(
                    " AND ({expr} = ? OR ({expr} >= ? AND {expr} < ?))"
                ));
                params.push(libsql::Value::Text(prefix.to_string()));
                params.push(libsql::Value::Text(format!("{}/", prefix)));
                params.push(libsql::Value::Text(format!("{}0", prefix)));
            }
            Filter::Neq(..) | Filter::ContainsInsensitive(..) => {}
        }
    }
    (clause, params)
}

/// `json_extract` for a plain column name; anything else stays in process
fn column_expr(column: &str) -> Option<String> {
    if column == "id" {
        return Some("id".to_string());
    }
    let plain = !column.is_empty()
        && column
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    plain.then(|| format!("json_extract(data, '$.{}')", column))
}

fn sql_value(value: &Value) -> Option<libsql::Value> {
    match value {
        Value::String(text) => Some(libsql::Value::Text(text.clone())),
        Value::Bool(flag) => Some(libsql::Value::Integer(i64::from(*flag))),
        Value::Number(number) => number_value(number),
        _ => None,
    }
}

fn number_value(number: &Number) -> Option<libsql::Value> {
    match number.as_i64() {
        Some(int) => Some(libsql::Value::Integer(int)),
        None => number.as_f64().map(libsql::Value::Real),
    }
}
