// ABOUTME: Connection collaborator for the departments table
// ABOUTME: Defines the table/transaction traits and opens a PostgreSQL or SQLite backend

pub mod postgres;
pub mod sqlite;

use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::SyncError;
use crate::model::{Key, Record};

pub use self::postgres::PostgresTable;
pub use self::sqlite::SqliteTable;

pub const TABLE_NAME: &str = "departments";

/// A live connection to the `departments` table.
///
/// The connection is released when the value is dropped.
#[allow(async_fn_in_trait)]
pub trait DepartmentTable {
    type Transaction<'a>: TableTransaction
    where
        Self: 'a;

    /// Read every row, ordered by `(DepCode, DepJob)`.
    async fn read_all(&mut self) -> Result<Vec<Record>, SyncError>;

    /// Open a transaction. Auto-commit stays suspended until the returned value is
    /// committed, rolled back or dropped (dropping rolls back).
    async fn begin(&mut self) -> Result<Self::Transaction<'_>, SyncError>;
}

/// Writes against the table inside one open transaction.
///
/// Each write returns the number of affected rows.
#[allow(async_fn_in_trait)]
pub trait TableTransaction {
    async fn read_all(&mut self) -> Result<Vec<Record>, SyncError>;

    async fn delete(&mut self, key: &Key) -> Result<u64, SyncError>;

    /// Rewrite `Description` of the row matching the record's key.
    async fn update_description(&mut self, record: &Record) -> Result<u64, SyncError>;

    async fn insert(&mut self, record: &Record) -> Result<u64, SyncError>;

    async fn commit(self) -> Result<(), SyncError>;

    async fn rollback(self) -> Result<(), SyncError>;
}

/// Supported database backends, selected by URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Postgres,
    Sqlite,
}

impl BackendKind {
    pub fn detect(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(BackendKind::Postgres)
        } else if url.starts_with("sqlite:") {
            Some(BackendKind::Sqlite)
        } else {
            None
        }
    }
}

/// An open table connection of either backend.
pub enum Backend {
    Postgres(PostgresTable),
    Sqlite(SqliteTable),
}

/// Open the table connection described by `config`.
///
/// # Errors
///
/// `SyncError::Connection` for an unknown URL scheme, bad credentials or an
/// unreachable server. The error names the target without its password.
pub async fn connect(config: &DatabaseConfig) -> Result<Backend, SyncError> {
    let target = describe_target(config);
    tracing::info!("Connecting to {}", target);

    match BackendKind::detect(&config.url) {
        Some(BackendKind::Postgres) => PostgresTable::connect(config)
            .await
            .map(Backend::Postgres)
            .map_err(|source| SyncError::Connection { target, source }),
        Some(BackendKind::Sqlite) => SqliteTable::open(config)
            .map(Backend::Sqlite)
            .map_err(|source| SyncError::Connection { target, source }),
        None => Err(SyncError::Connection {
            target,
            source: "unsupported URL scheme (expected postgresql://, postgres:// or sqlite:)"
                .into(),
        }),
    }
}

/// Connection target for diagnostics: the URL without its password, plus the user
/// configured separately if any.
pub fn describe_target(config: &DatabaseConfig) -> String {
    let url = redact_url(&config.url);
    match &config.user {
        Some(user) => format!("{} (user {})", url, user),
        None => url,
    }
}

/// Remove passwords from a connection string.
///
/// URLs lose the password of their userinfo and any `password` query parameter.
/// libpq `key=value` strings keep their keys with the password value masked. Anything
/// else that carries credentials is reduced to its scheme.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                // Only fails for cannot-be-a-base URLs, which carry no password
                let _ = parsed.set_password(None);
            }
            strip_query_password(&mut parsed);
            parsed.to_string()
        }
        Err(_) if raw.contains('=') => mask_keyword_password(raw),
        Err(_) if raw.contains('@') => {
            let scheme = raw.split_once(':').map(|(s, _)| s).unwrap_or("database");
            format!("{}://<redacted>", scheme)
        }
        Err(_) => raw.to_string(),
    }
}

fn strip_query_password(url: &mut url::Url) {
    let has_password = url
        .query_pairs()
        .any(|(key, _)| key.eq_ignore_ascii_case(PASSWORD_KEY));
    if !has_password {
        return;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.eq_ignore_ascii_case(PASSWORD_KEY))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
}

const PASSWORD_KEY: &str = "password";

/// Mask the value of every `password = value` pair in a libpq keyword string.
///
/// Values may be single-quoted with backslash escapes.
fn mask_keyword_password(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = find_keyword(rest, PASSWORD_KEY) {
        let after_key = &rest[start + PASSWORD_KEY.len()..];
        let Some(value) = after_key.trim_start().strip_prefix('=') else {
            out.push_str(&rest[..start + PASSWORD_KEY.len()]);
            rest = after_key;
            continue;
        };
        let value = value.trim_start();
        out.push_str(&rest[..start]);
        out.push_str("password=<redacted>");
        rest = &value[keyword_value_len(value)..];
    }

    out.push_str(rest);
    out
}

/// Byte offset of `keyword` (ASCII, case-insensitive) where it starts a word.
fn find_keyword(haystack: &str, keyword: &str) -> Option<usize> {
    let lower = haystack.to_ascii_lowercase();
    let mut from = 0;
    while let Some(offset) = lower[from..].find(keyword) {
        let at = from + offset;
        if at == 0 || lower.as_bytes()[at - 1].is_ascii_whitespace() {
            return Some(at);
        }
        from = at + keyword.len();
    }
    None
}

fn keyword_value_len(value: &str) -> usize {
    let bytes = value.as_bytes();
    if bytes.first() != Some(&b'\'') {
        return value.find(char::is_whitespace).unwrap_or(value.len());
    }

    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' => return i + 1,
            _ => i += 1,
        }
    }
    value.len()
}

/// Turn the three selected columns of a row into a record.
///
/// A NULL `Description` reads as the empty string. NULL or empty key columns are a
/// data access failure: such a row cannot be matched against the document.
pub(crate) fn record_from_columns(
    dep_code: Option<String>,
    dep_job: Option<String>,
    description: Option<String>,
) -> Result<Record, SyncError> {
    let (dep_code, dep_job) = match (dep_code, dep_job) {
        (Some(code), Some(job)) => (code, job),
        (code, job) => {
            return Err(SyncError::data_access_msg(format!(
                "Table {} has a row with a NULL key column (DepCode={:?}, DepJob={:?})",
                TABLE_NAME, code, job
            )))
        }
    };

    Record::new(dep_code, dep_job, description.unwrap_or_default()).map_err(|err| match err {
        SyncError::InvalidKey { dep_code, dep_job } => SyncError::data_access_msg(format!(
            "Table {} has a row with an empty key column (DepCode={:?}, DepJob={:?})",
            TABLE_NAME, dep_code, dep_job
        )),
        other => other,
    })
}

fn timeout_secs(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|s| *s > 0).map(Duration::from_secs)
}
