// ABOUTME: Error taxonomy for export and sync
// ABOUTME: Separates pre-mutation failures from data access failures that force a rollback

use std::path::PathBuf;

use thiserror::Error;

use crate::model::Key;

/// Boxed driver error (tokio-postgres, rusqlite, native-tls).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The table connection could not be established.
    ///
    /// `target` is the connection URL with the password removed.
    #[error("cannot connect to database {target}")]
    Connection {
        target: String,
        #[source]
        source: BoxError,
    },

    /// The document is not well-formed or does not follow the `Departments` schema.
    #[error("malformed document {location}: {message}")]
    Parse { location: String, message: String },

    #[error("document not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The document holds two records with the same composite key.
    #[error("duplicate record in document for key {0}")]
    DuplicateKey(Key),

    #[error("record has an empty key field (DepCode={dep_code:?}, DepJob={dep_job:?})")]
    InvalidKey { dep_code: String, dep_job: String },

    /// A table read or write failed.
    #[error("{context}")]
    DataAccess {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub fn data_access(
        context: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        SyncError::DataAccess {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    /// A data access failure detected by this crate rather than reported by the driver.
    pub fn data_access_msg(context: impl Into<String>) -> Self {
        SyncError::DataAccess {
            context: context.into(),
            source: None,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure happened before anything in the table could have changed.
    pub fn is_pre_mutation(&self) -> bool {
        !matches!(self, SyncError::DataAccess { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_key_message_names_key() {
        let key = Key::new("A", "1").unwrap();
        let err = SyncError::DuplicateKey(key);
        assert_eq!(
            err.to_string(),
            "duplicate record in document for key (DepCode=A, DepJob=1)"
        );
    }

    #[test]
    fn test_data_access_keeps_driver_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let err = SyncError::data_access("Failed to delete row", io);
        assert_eq!(err.to_string(), "Failed to delete row");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "socket closed");
        assert!(!err.is_pre_mutation());
    }

    #[test]
    fn test_pre_mutation_classification() {
        assert!(SyncError::FileNotFound(PathBuf::from("missing.xml")).is_pre_mutation());
        assert!(SyncError::Parse {
            location: "doc.xml".to_string(),
            message: "unexpected end of document".to_string(),
        }
        .is_pre_mutation());
        assert!(!SyncError::data_access_msg("row vanished").is_pre_mutation());
    }
}
