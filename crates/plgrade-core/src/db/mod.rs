//! SQLite storage for plgrade
//!
//! Every mutating operation runs in its own IMMEDIATE transaction, so the
//! read-compare-write of a score is atomic relative to other writers on the
//! same database file.

mod assessments;
mod fixture;
mod instance_questions;
mod rubrics;
mod schema;
mod store;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};

use crate::config::GradingConfig;
use crate::error::{GradeError, Result};
use crate::numeric::coerce_nan;
use crate::map_db_err;

pub use assessments::InstanceQuestionSummary;
pub use fixture::{
    AssessmentInstanceFixture, GradebookFixture, InstanceQuestionFixture, RubricFixture,
    SubmissionFixture, ZoneFixture,
};
pub use instance_questions::{NewSubmission, SubmissionOutcome};
pub use rubrics::RubricStatus;
pub use schema::{create_schema, schema_version, CURRENT_SCHEMA_VERSION};
pub use store::ScoreTransaction;

/// Default database file name inside the root directory
pub const DB_FILE: &str = "plgrade.db";

/// SQLite database for plgrade
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    config: GradingConfig,
}

impl Database {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            GradeError::Other(format!(
                "failed to open database at {}: {}",
                path.display(),
                e
            ))
        })?;

        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| map_db_err!("set busy timeout", e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| GradeError::Other(format!("failed to enable WAL mode: {}", e)))?;

        Self::init(conn)
    }

    /// Private database for tests and one-shot computations
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| GradeError::Other(format!("failed to open in-memory database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| map_db_err!("enable foreign keys", e))?;
        create_schema(&conn)?;

        Ok(Database {
            conn,
            config: GradingConfig::default(),
        })
    }

    /// Use `config` for later operations; also applies its NaN reporting switch
    pub fn with_config(mut self, config: GradingConfig) -> Self {
        crate::numeric::metrics().set_enabled(config.data_quality.report_nan);
        self.config = config;
        self
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    pub fn get_schema_version(&self) -> Result<i32> {
        schema_version(&self.conn)
            .map_err(|e| map_db_err!("get schema version", e))
    }

    /// Begin a write transaction that takes the database lock up front
    fn immediate(&self) -> Result<Transaction<'_>> {
        Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(|e| map_db_err!("begin transaction", e))
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.conn.pragma_update(None, "wal_checkpoint", "TRUNCATE");
    }
}

pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GradeError::invalid_input("timestamp", format!("{text}: {e}")))
}

/// Current time truncated to the stored precision
pub(crate) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    parse_timestamp(&timestamp(&now)).unwrap_or(now)
}

/// Read a nullable numeric column, coercing NaN to zero.
///
/// Older rows may hold NaN as text; SQLite cannot store it as REAL.
pub(crate) fn read_real(row: &Row<'_>, idx: usize, field: &'static str) -> rusqlite::Result<Option<f64>> {
    let value = match row.get_ref(idx)? {
        ValueRef::Null => return Ok(None),
        ValueRef::Integer(i) => i as f64,
        ValueRef::Real(f) => f,
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(f64::NAN),
        ValueRef::Blob(_) => {
            return Err(rusqlite::Error::InvalidColumnType(
                idx,
                field.to_string(),
                rusqlite::types::Type::Blob,
            ))
        }
    };
    Ok(Some(coerce_nan(field, value)))
}

/// Like [`read_real`] for NOT NULL columns
pub(crate) fn read_points(row: &Row<'_>, idx: usize, field: &'static str) -> rusqlite::Result<f64> {
    Ok(read_real(row, idx, field)?.unwrap_or(0.0))
}

pub(crate) fn read_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

pub(crate) fn json_column<T: serde::Serialize>(value: Option<&T>) -> Result<Value> {
    match value {
        Some(v) => Ok(Value::Text(serde_json::to_string(v)?)),
        None => Ok(Value::Null),
    }
}
