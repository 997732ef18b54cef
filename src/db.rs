use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::GatewayError;
use crate::gateway::{Filter, Ordering, RemoteTableGateway, Row};

/// Event for audit trail ("Every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("Failed to enable WAL mode")?;

    // ==========================================================================
    // Branches Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS branches (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL UNIQUE,
            address TEXT NOT NULL,
            city TEXT,
            state TEXT,
            country TEXT,
            email TEXT,
            phone TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            manager_id TEXT,
            code TEXT UNIQUE,
            opening_hours TEXT,
            closing_hours TEXT,
            tax_rate REAL NOT NULL DEFAULT 0,
            max_capacity INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_branches_name ON branches(name)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity (newest first)
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        5,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// SQLITE GATEWAY
// ============================================================================

/// Actor recorded on audit events written by the gateway
const GATEWAY_ACTOR: &str = "sqlite_gateway";

/// [`RemoteTableGateway`] backed by a local SQLite database
#[derive(Clone)]
pub struct SqliteGateway {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGateway {
    /// Open (or create) the database file and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        SqliteGateway {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Audit trail for one row of `table`
    pub fn events_for(&self, table: &str, id: &str) -> Result<Vec<Event>> {
        get_events_for_entity(&self.lock(), table, id)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn select_rows(
        &self,
        table: &str,
        filters: &[Filter],
        ordering: Option<&Ordering>,
    ) -> Result<Vec<Row>, GatewayError> {
        let mut sql = format!("SELECT * FROM {}", identifier(table)?);
        let mut values = Vec::with_capacity(filters.len());

        for (i, filter) in filters.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!("{} = ?{}", identifier(&filter.column)?, i + 1));
            values.push(to_sql(&filter.value));
        }

        if let Some(order) = ordering {
            let direction = if order.ascending { "ASC" } else { "DESC" };
            sql.push_str(&format!(" ORDER BY {} {}", identifier(&order.column)?, direction));
        }

        let conn = self.lock();
        query_rows(&conn, &sql, values)
    }

    fn insert_row(&self, table: &str, mut row: Row) -> Result<Row, GatewayError> {
        let table = identifier(table)?;

        // The store owns identity
        let id = match row.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        row.insert("id".to_string(), Value::from(id.as_str()));

        let mut columns = Vec::with_capacity(row.len());
        let mut placeholders = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for (i, (column, value)) in row.iter().enumerate() {
            columns.push(identifier(column)?);
            placeholders.push(format!("?{}", i + 1));
            values.push(to_sql(value));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );

        let conn = self.lock();
        conn.execute(&sql, params_from_iter(values))?;

        let inserted = fetch_by_id(&conn, table, &id)?.ok_or_else(|| GatewayError::RowNotFound(id.clone()))?;
        record(&conn, "row_inserted", table, &id, Value::Object(row));
        Ok(inserted)
    }

    fn update_row(&self, table: &str, id: &str, mut patch: Row) -> Result<Row, GatewayError> {
        let table = identifier(table)?;

        // Identity is immutable
        patch.remove("id");

        let conn = self.lock();

        if !patch.is_empty() {
            let mut assignments = Vec::with_capacity(patch.len());
            let mut values = Vec::with_capacity(patch.len() + 1);
            for (i, (column, value)) in patch.iter().enumerate() {
                assignments.push(format!("{} = ?{}", identifier(column)?, i + 1));
                values.push(to_sql(value));
            }
            values.push(SqlValue::Text(id.to_string()));

            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?{}",
                table,
                assignments.join(", "),
                values.len()
            );
            let changed = conn.execute(&sql, params_from_iter(values))?;
            if changed == 0 {
                return Err(GatewayError::RowNotFound(id.to_string()));
            }
        }

        let updated = fetch_by_id(&conn, table, id)?.ok_or_else(|| GatewayError::RowNotFound(id.to_string()))?;
        record(&conn, "row_updated", table, id, Value::Object(patch));
        Ok(updated)
    }

    fn delete_row(&self, table: &str, id: &str) -> Result<(), GatewayError> {
        let table = identifier(table)?;

        let conn = self.lock();
        let changed = conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table), [id])?;
        if changed == 0 {
            return Err(GatewayError::RowNotFound(id.to_string()));
        }

        record(&conn, "row_deleted", table, id, serde_json::json!({}));
        Ok(())
    }
}

#[async_trait]
impl RemoteTableGateway for SqliteGateway {
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        ordering: Option<&Ordering>,
    ) -> Result<Vec<Row>, GatewayError> {
        self.select_rows(table, filters, ordering)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, GatewayError> {
        self.insert_row(table, row)
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<Row, GatewayError> {
        self.update_row(table, id, patch)
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), GatewayError> {
        self.delete_row(table, id)
    }
}

/// Table and column names are spliced into SQL, so only plain identifiers pass
fn identifier(name: &str) -> Result<&str, GatewayError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(name)
    } else {
        Err(GatewayError::Failure(format!("invalid identifier: {:?}", name)))
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::from(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn query_rows(conn: &Connection, sql: &str, values: Vec<SqlValue>) -> Result<Vec<Row>, GatewayError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            let mut out = Row::new();
            for (i, column) in columns.iter().enumerate() {
                out.insert(column.clone(), from_sql(row.get_ref(i)?));
            }
            Ok(out)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn fetch_by_id(conn: &Connection, table: &str, id: &str) -> Result<Option<Row>, GatewayError> {
    let sql = format!("SELECT * FROM {} WHERE id = ?1", table);
    let mut stmt = conn.prepare(&sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let row = stmt
        .query_row([id], |row| {
            let mut out = Row::new();
            for (i, column) in columns.iter().enumerate() {
                out.insert(column.clone(), from_sql(row.get_ref(i)?));
            }
            Ok(out)
        })
        .optional()?;

    Ok(row)
}

fn record(conn: &Connection, event_type: &str, table: &str, id: &str, data: Value) {
    let event = Event::new(event_type, table, id, data, GATEWAY_ACTOR);
    if let Err(e) = insert_event(conn, &event) {
        tracing::warn!("Failed to record {} event for {}: {}", event_type, id, e);
    }
}
