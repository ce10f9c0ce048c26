//! Storage error types.

/// Errors that can occur while talking to the database.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The table does not exist, or has no usable columns.
    #[error("no such table: {0}")]
    NoSuchTable(String),

    /// A lock could not be acquired in time.
    #[error("timed out after {timeout_secs}s waiting for the {what} lock")]
    LockTimeout {
        /// What the lock protects (e.g., "reflection").
        what: String,
        /// How long we waited, in seconds.
        timeout_secs: u64,
    },

    /// Failed to establish or maintain a database connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// The configuration can not be used.
    #[error("invalid database config: {0}")]
    Config(String),

    /// A raw SQLite query error.
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    // -- Constructors --------------------------------------------------------

    /// Creates a [`StorageError::NoSuchTable`] for the given table name.
    pub fn no_such_table(table: impl Into<String>) -> Self {
        Self::NoSuchTable(table.into())
    }

    /// Creates a [`StorageError::LockTimeout`].
    pub fn lock_timeout(what: impl Into<String>, timeout_secs: u64) -> Self {
        Self::LockTimeout {
            what: what.into(),
            timeout_secs,
        }
    }

    // -- Predicates ----------------------------------------------------------

    /// Returns `true` if this is a [`StorageError::NoSuchTable`].
    pub fn is_no_such_table(&self) -> bool {
        matches!(self, Self::NoSuchTable(_))
    }

    /// Returns `true` if the error is transient and the operation may succeed
    /// on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            StorageError::no_such_table("census").to_string(),
            "no such table: census"
        );
        assert_eq!(
            StorageError::lock_timeout("reflection", 10).to_string(),
            "timed out after 10s waiting for the reflection lock"
        );
    }

    #[test]
    fn predicates() {
        assert!(StorageError::no_such_table("t").is_no_such_table());
        assert!(StorageError::lock_timeout("x", 1).is_retryable());
        assert!(!StorageError::Internal("boom".into()).is_retryable());
    }
}
