//! CRM record store backed by SQLite.
//!
//! The solver path only ever reads; `ensure_schema` provisions tables at
//! startup so a fresh database file is usable. Rows come back as JSON maps
//! so downstream code (tool results, HTTP responses) can stay schema-free.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// SQLite-backed record store.
///
/// The connection is shared behind a mutex; one statement runs at a time,
/// which matches the strictly sequential solver model.
pub struct RecordStore {
    conn: Mutex<Connection>,
}

/// CRM schema, mirrored in the database tool's descriptor metadata.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS leads (
    lead_id INTEGER PRIMARY KEY,
    first_name TEXT,
    last_name TEXT,
    company_name TEXT,
    email TEXT,
    lead_status TEXT,
    lead_rating TEXT,
    annual_revenue REAL,
    ai_score REAL,
    created_at TEXT
);
CREATE TABLE IF NOT EXISTS contacts (
    contact_id INTEGER PRIMARY KEY,
    first_name TEXT,
    last_name TEXT,
    account_id INTEGER,
    email TEXT,
    title TEXT,
    department TEXT
);
CREATE TABLE IF NOT EXISTS accounts (
    account_id INTEGER PRIMARY KEY,
    account_name TEXT,
    industry TEXT,
    annual_revenue REAL,
    employee_count INTEGER
);
CREATE TABLE IF NOT EXISTS opportunities (
    opportunity_id INTEGER PRIMARY KEY,
    opportunity_name TEXT,
    account_id INTEGER,
    amount REAL,
    stage TEXT,
    probability REAL,
    close_date TEXT,
    is_closed INTEGER NOT NULL DEFAULT 0,
    is_won INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS activities (
    activity_id INTEGER PRIMARY KEY,
    activity_type TEXT,
    subject TEXT,
    status TEXT,
    related_to_type TEXT,
    related_to_id INTEGER,
    created_at TEXT
);
"#;

impl RecordStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store. Used by tests and demos.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create the CRM tables if they do not exist.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Execute a raw read query and return rows as JSON maps.
    ///
    /// Callers are responsible for ensuring the statement is read-only; the
    /// database tool enforces that before dispatching here.
    pub fn query(&self, sql: &str) -> Result<Vec<Map<String, Value>>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(sql)?;
        let column_names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = Map::with_capacity(column_names.len());
            for (idx, name) in column_names.iter().enumerate() {
                map.insert(name.clone(), value_ref_to_json(row.get_ref(idx)?));
            }
            out.push(map);
        }
        Ok(out)
    }

    /// Execute arbitrary statements. Provisioning and test seeding only;
    /// never reachable from the solver path.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}
