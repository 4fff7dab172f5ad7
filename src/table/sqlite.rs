// ABOUTME: SQLite backend for the departments table
// ABOUTME: Opens an existing database file with rusqlite and writes inside an IMMEDIATE transaction

use rusqlite::{params, Connection, OpenFlags, Transaction, TransactionBehavior};

use super::{record_from_columns, timeout_secs, DepartmentTable, TableTransaction};
use crate::config::DatabaseConfig;
use crate::error::{BoxError, SyncError};
use crate::model::{Key, Record};

const SELECT_SQL: &str =
    "SELECT DepCode, DepJob, Description FROM departments ORDER BY DepCode, DepJob";
const DELETE_SQL: &str = "DELETE FROM departments WHERE DepCode = ?1 AND DepJob = ?2";
const UPDATE_SQL: &str =
    "UPDATE departments SET Description = ?1 WHERE DepCode = ?2 AND DepJob = ?3";
const INSERT_SQL: &str =
    "INSERT INTO departments (DepCode, DepJob, Description) VALUES (?1, ?2, ?3)";

pub struct SqliteTable {
    conn: Connection,
}

impl SqliteTable {
    /// Open the database named by a `sqlite:` URL.
    ///
    /// The file must already exist.
    pub fn open(config: &DatabaseConfig) -> Result<Self, BoxError> {
        let path = sqlite_path(&config.url);
        tracing::debug!("Opening SQLite database '{}'", path);

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        if let Some(timeout) = timeout_secs(config.statement_timeout_secs) {
            conn.busy_timeout(timeout)?;
        }

        Ok(Self { conn })
    }

    /// Wrap an already open connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }
}

/// Strip the `sqlite://` or `sqlite:` prefix from a URL.
pub fn sqlite_path(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

impl DepartmentTable for SqliteTable {
    type Transaction<'a> = SqliteTransaction<'a>;

    async fn read_all(&mut self) -> Result<Vec<Record>, SyncError> {
        read_rows(&self.conn)
    }

    async fn begin(&mut self) -> Result<SqliteTransaction<'_>, SyncError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| SyncError::data_access("Failed to begin transaction", e))?;
        Ok(SqliteTransaction { tx })
    }
}

/// An open SQLite transaction. Dropping it without committing rolls back.
pub struct SqliteTransaction<'a> {
    tx: Transaction<'a>,
}

impl TableTransaction for SqliteTransaction<'_> {
    async fn read_all(&mut self) -> Result<Vec<Record>, SyncError> {
        read_rows(&self.tx)
    }

    async fn delete(&mut self, key: &Key) -> Result<u64, SyncError> {
        self.tx
            .execute(DELETE_SQL, params![key.dep_code(), key.dep_job()])
            .map(|n| n as u64)
            .map_err(|e| SyncError::data_access(format!("Failed to delete {}", key), e))
    }

    async fn update_description(&mut self, record: &Record) -> Result<u64, SyncError> {
        self.tx
            .execute(
                UPDATE_SQL,
                params![record.description(), record.dep_code(), record.dep_job()],
            )
            .map(|n| n as u64)
            .map_err(|e| SyncError::data_access(format!("Failed to update {}", record.key()), e))
    }

    async fn insert(&mut self, record: &Record) -> Result<u64, SyncError> {
        self.tx
            .execute(
                INSERT_SQL,
                params![record.dep_code(), record.dep_job(), record.description()],
            )
            .map(|n| n as u64)
            .map_err(|e| SyncError::data_access(format!("Failed to insert {}", record.key()), e))
    }

    async fn commit(self) -> Result<(), SyncError> {
        self.tx
            .commit()
            .map_err(|e| SyncError::data_access("Failed to commit transaction", e))
    }

    async fn rollback(self) -> Result<(), SyncError> {
        self.tx
            .rollback()
            .map_err(|e| SyncError::data_access("Failed to roll back transaction", e))
    }
}

fn read_rows(conn: &Connection) -> Result<Vec<Record>, SyncError> {
    let mut stmt = conn
        .prepare(SELECT_SQL)
        .map_err(|e| SyncError::data_access("Failed to prepare departments query", e))?;

    let columns = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })
        .map_err(|e| SyncError::data_access("Failed to read departments", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SyncError::data_access("Failed to read departments", e))?;

    columns
        .into_iter()
        .map(|(dep_code, dep_job, description)| record_from_columns(dep_code, dep_job, description))
        .collect()
}
