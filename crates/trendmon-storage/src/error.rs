use rusqlite::ErrorCode;

/// Errors that can occur within the storage layer.
///
/// Callers distinguish a store that cannot be reached at all
/// ([`StorageError::is_unavailable`]) from failures tied to a single
/// record; only the former aborts an ingestion batch.
///
/// # Examples
///
/// ```rust
/// use trendmon_storage::error::StorageError;
///
/// let err = StorageError::Unavailable {
///     path: "data/trendmon.db".to_string(),
///     reason: "permission denied".to_string(),
/// };
/// assert!(err.is_unavailable());
/// assert!(err.to_string().contains("trendmon.db"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The database could not be opened or is not reachable.
    #[error("Storage: database unavailable at {path}: {reason}")]
    Unavailable { path: String, reason: String },

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored granularity column did not parse.
    #[error("Storage: invalid granularity '{value}'")]
    InvalidGranularity { value: String },

    /// A stored bucket timestamp is out of range.
    #[error("Storage: invalid bucket timestamp {millis}")]
    InvalidTimestamp { millis: i64 },

    /// A value does not fit the column it is written to or read from.
    #[error("Storage: value out of range for column '{column}'")]
    OutOfRange { column: &'static str },

    /// Generic storage error for cases not covered by other variants.
    #[error("Storage: {0}")]
    Other(String),
}

impl StorageError {
    /// True when the store as a whole cannot serve requests, as opposed to a
    /// failure scoped to one record.
    pub fn is_unavailable(&self) -> bool {
        match self {
            StorageError::Unavailable { .. } => true,
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::DiskFull
                    | ErrorCode::ReadOnly
            ),
            _ => false,
        }
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_database_counts_as_unavailable() {
        let err = StorageError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(err.is_unavailable());
    }

    #[test]
    fn record_level_errors_are_not_unavailable() {
        assert!(!StorageError::InvalidGranularity {
            value: "week".into()
        }
        .is_unavailable());
        assert!(!StorageError::Sqlite(rusqlite::Error::QueryReturnedNoRows).is_unavailable());
    }
}
