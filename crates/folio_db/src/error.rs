//! Error types for the table-access facade.

use thiserror::Error;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Identifier failed the allow-list check
    #[error("invalid identifier: {0}")]
    BadIdentifier(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Row value could not be converted to the requested type
    #[error("type conversion error: {0}")]
    TypeConversion(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a type conversion error.
    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }
}
