#![forbid(unsafe_code)]

mod days;
mod error;
mod history;
mod legacy;
mod plans;
mod progress_store;

pub use error::StoreError;
pub use legacy::{LegacyMigrator, MigrationReport, MigrationWarning};
pub use progress_store::{ProgressStore, StoreTx, TransactionalStore};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DB_FILE_NAME: &str = "readplan.db";
const STORE_SCHEMA_VERSION: i64 = 3;

const REQUIRED_TABLES: [&str; 4] = ["store_state", "plans", "plan_days", "plan_history"];

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: Option<PathBuf>,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE_NAME);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA synchronous=NORMAL;\n\
             PRAGMA foreign_keys=ON;",
        )?;

        preflight_gate(&conn)?;
        install_schema(&conn)?;

        Ok(Self {
            conn,
            storage_dir: Some(storage_dir),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        install_schema(&conn)?;
        Ok(Self {
            conn,
            storage_dir: None,
        })
    }

    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )?)
    }

    /// Whether the single-cycle tables are still present.
    pub fn has_legacy_tables(&self) -> Result<bool, StoreError> {
        legacy::legacy_tables_present(&self.conn)
    }

    fn begin_write(&mut self) -> Result<StoreTx<'_>, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(StoreTx::new(tx))
    }

    fn begin_read(&self) -> Result<StoreTx<'_>, StoreError> {
        Ok(StoreTx::new(self.conn.unchecked_transaction()?))
    }
}

fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    let known: BTreeSet<&str> = REQUIRED_TABLES
        .into_iter()
        .chain(legacy::LEGACY_TABLES)
        .collect();
    if tables.iter().any(|table| !known.contains(table.as_str())) {
        return Err(StoreError::ResetRequired("unsupported tables detected"));
    }

    let present = REQUIRED_TABLES
        .iter()
        .filter(|table| tables.contains(**table))
        .count();
    if present == 0 {
        // Fresh install, possibly next to legacy tables awaiting migration.
        return Ok(());
    }
    if present != REQUIRED_TABLES.len() {
        return Err(StoreError::ResetRequired("required table is missing"));
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == STORE_SCHEMA_VERSION => Ok(()),
        Some(_) => Err(StoreError::ResetRequired("schema version mismatch")),
        None => Err(StoreError::ResetRequired("schema state row is missing")),
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    let now_ms = to_ms(Utc::now());

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS plans (
          id TEXT PRIMARY KEY,
          name TEXT,
          description TEXT,
          day_count INTEGER NOT NULL CHECK(day_count > 0),
          versification TEXT NOT NULL,
          start_date_ms INTEGER,
          day_complete INTEGER,
          current_day INTEGER NOT NULL DEFAULT 1 CHECK(current_day >= 1),
          iteration INTEGER NOT NULL DEFAULT 1 CHECK(iteration >= 1),
          version INTEGER
        );

        CREATE TABLE IF NOT EXISTS plan_days (
          plan_id TEXT NOT NULL,
          day_number INTEGER NOT NULL CHECK(day_number >= 1),
          reading_date TEXT,
          assignment TEXT NOT NULL,
          PRIMARY KEY(plan_id, day_number),
          FOREIGN KEY(plan_id) REFERENCES plans(id)
            ON DELETE CASCADE
            ON UPDATE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_plan_days_reading_date
          ON plan_days(reading_date);

        CREATE TABLE IF NOT EXISTS plan_history (
          plan_id TEXT NOT NULL,
          day_number INTEGER NOT NULL CHECK(day_number >= 1),
          iteration INTEGER NOT NULL CHECK(iteration >= 1),
          completed_at_ms INTEGER,
          status TEXT NOT NULL CHECK(status IN ('completed', 'skipped', 'unread')),
          PRIMARY KEY(plan_id, day_number, iteration),
          FOREIGN KEY(plan_id) REFERENCES plans(id)
            ON DELETE CASCADE
            ON UPDATE CASCADE
        );
        "#,
    )?;

    conn.execute(
        "INSERT INTO store_state(singleton, schema_version, created_at_ms, updated_at_ms) \
         VALUES (1, ?1, ?2, ?2) \
         ON CONFLICT(singleton) DO UPDATE SET schema_version=excluded.schema_version, updated_at_ms=excluded.updated_at_ms",
        params![STORE_SCHEMA_VERSION, now_ms],
    )?;

    Ok(())
}

fn to_ms(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

fn from_ms(table: &'static str, value: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| StoreError::corrupt(table, format!("timestamp out of range: {value}")))
}
