//! Error types for SQLite operations.

use quarry_query::{ErrorCode, QueryError};
use rusqlite::ffi;
use thiserror::Error;

/// Result type for SQLite operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Error type for SQLite operations.
#[derive(Error, Debug)]
pub enum SqliteError {
    /// Pool error.
    #[error("Pool error: {0}")]
    Pool(String),
    /// SQLite driver error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Statement timeout, in milliseconds.
    #[error("Statement timed out after {0}ms")]
    Timeout(u64),
}

impl SqliteError {
    /// Create a pool error.
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }
}

impl From<rusqlite::Error> for SqliteError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(tokio_rusqlite::Error::Rusqlite(err))
    }
}

impl From<SqliteError> for QueryError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Pool(msg) => QueryError::pool_exhausted(msg),
            SqliteError::Sqlite(tokio_rusqlite::Error::Rusqlite(e)) => from_rusqlite(e),
            SqliteError::Sqlite(tokio_rusqlite::Error::ConnectionClosed) => {
                QueryError::connection("connection closed")
            }
            SqliteError::Sqlite(other) => QueryError::database(other.to_string()),
            SqliteError::Config(msg) => QueryError::config(msg),
            SqliteError::Connection(msg) => QueryError::connection(msg),
            SqliteError::Timeout(ms) => QueryError::timeout(ms),
        }
    }
}

/// Classify a driver error, using SQLite's extended result codes for
/// constraint violations.
fn from_rusqlite(err: rusqlite::Error) -> QueryError {
    let rusqlite::Error::SqliteFailure(failure, detail) = &err else {
        return QueryError::database(err.to_string()).with_source(err);
    };

    let message = detail.clone().unwrap_or_else(|| failure.to_string());
    let code = match failure.extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            Some(ErrorCode::UniqueConstraint)
        }
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(ErrorCode::ForeignKeyConstraint),
        ffi::SQLITE_CONSTRAINT_NOTNULL => Some(ErrorCode::NotNullConstraint),
        ffi::SQLITE_CONSTRAINT_CHECK => Some(ErrorCode::CheckConstraint),
        _ => None,
    };

    match (code, failure.code) {
        (Some(code), _) => QueryError::constraint(code, message).with_source(err),
        (None, rusqlite::ErrorCode::OperationInterrupted) => {
            QueryError::database("statement interrupted").with_source(err)
        }
        (None, rusqlite::ErrorCode::CannotOpen) => QueryError::connection(message).with_source(err),
        (None, _) => QueryError::database(message).with_source(err),
    }
}
