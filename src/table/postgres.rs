// ABOUTME: PostgreSQL backend for the departments table
// ABOUTME: Connects with tokio-postgres over native-tls and runs keyed writes in a transaction

use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{Client, Row, Transaction};

use super::{record_from_columns, timeout_secs, DepartmentTable, TableTransaction};
use crate::config::DatabaseConfig;
use crate::error::{BoxError, SyncError};
use crate::model::{Key, Record};

const SELECT_SQL: &str =
    "SELECT DepCode, DepJob, Description FROM departments ORDER BY DepCode, DepJob";
const DELETE_SQL: &str = "DELETE FROM departments WHERE DepCode = $1 AND DepJob = $2";
const UPDATE_SQL: &str =
    "UPDATE departments SET Description = $1 WHERE DepCode = $2 AND DepJob = $3";
const INSERT_SQL: &str =
    "INSERT INTO departments (DepCode, DepJob, Description) VALUES ($1, $2, $3)";

pub struct PostgresTable {
    client: Client,
}

impl PostgresTable {
    /// Connect using the URL and credentials in `config`.
    ///
    /// `user` and `password` from the config override those embedded in the URL. The
    /// connection driver runs on a spawned task that ends when the client is dropped.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, BoxError> {
        let mut pg_config: tokio_postgres::Config = config.url.parse()?;
        if let Some(user) = &config.user {
            pg_config.user(user);
        }
        if let Some(password) = &config.password {
            pg_config.password(password);
        }
        if let Some(timeout) = timeout_secs(config.connect_timeout_secs) {
            pg_config.connect_timeout(timeout);
        }

        if config.accept_invalid_certs {
            tracing::warn!("TLS certificate verification is disabled for this connection");
        }
        let tls = TlsConnector::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        let (client, connection) = pg_config.connect(MakeTlsConnector::new(tls)).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        if let Some(timeout) = timeout_secs(config.statement_timeout_secs) {
            client
                .batch_execute(&format!("SET statement_timeout = {}", timeout.as_millis()))
                .await?;
        }

        Ok(Self { client })
    }
}

impl DepartmentTable for PostgresTable {
    type Transaction<'a> = PostgresTransaction<'a>;

    async fn read_all(&mut self) -> Result<Vec<Record>, SyncError> {
        let rows = self
            .client
            .query(SELECT_SQL, &[])
            .await
            .map_err(|e| SyncError::data_access("Failed to read departments", e))?;
        rows_to_records(&rows)
    }

    async fn begin(&mut self) -> Result<PostgresTransaction<'_>, SyncError> {
        let tx = self
            .client
            .transaction()
            .await
            .map_err(|e| SyncError::data_access("Failed to begin transaction", e))?;
        Ok(PostgresTransaction { tx })
    }
}

/// An open PostgreSQL transaction. Dropping it without committing rolls back.
pub struct PostgresTransaction<'a> {
    tx: Transaction<'a>,
}

impl TableTransaction for PostgresTransaction<'_> {
    async fn read_all(&mut self) -> Result<Vec<Record>, SyncError> {
        let rows = self
            .tx
            .query(SELECT_SQL, &[])
            .await
            .map_err(|e| SyncError::data_access("Failed to read departments", e))?;
        rows_to_records(&rows)
    }

    async fn delete(&mut self, key: &Key) -> Result<u64, SyncError> {
        self.tx
            .execute(DELETE_SQL, &[&key.dep_code(), &key.dep_job()])
            .await
            .map_err(|e| SyncError::data_access(format!("Failed to delete {}", key), e))
    }

    async fn update_description(&mut self, record: &Record) -> Result<u64, SyncError> {
        self.tx
            .execute(
                UPDATE_SQL,
                &[&record.description(), &record.dep_code(), &record.dep_job()],
            )
            .await
            .map_err(|e| SyncError::data_access(format!("Failed to update {}", record.key()), e))
    }

    async fn insert(&mut self, record: &Record) -> Result<u64, SyncError> {
        self.tx
            .execute(
                INSERT_SQL,
                &[&record.dep_code(), &record.dep_job(), &record.description()],
            )
            .await
            .map_err(|e| SyncError::data_access(format!("Failed to insert {}", record.key()), e))
    }

    async fn commit(self) -> Result<(), SyncError> {
        self.tx
            .commit()
            .await
            .map_err(|e| SyncError::data_access("Failed to commit transaction", e))
    }

    async fn rollback(self) -> Result<(), SyncError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| SyncError::data_access("Failed to roll back transaction", e))
    }
}

fn rows_to_records(rows: &[Row]) -> Result<Vec<Record>, SyncError> {
    rows.iter()
        .map(|row| {
            let decode =
                |e: tokio_postgres::Error| SyncError::data_access("Failed to decode departments row", e);
            record_from_columns(
                row.try_get(0).map_err(decode)?,
                row.try_get(1).map_err(decode)?,
                row.try_get(2).map_err(decode)?,
            )
        })
        .collect()
}
