//! Schema registry errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchemaError>;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Database error: {0}")]
    Db(#[from] folio_db::DbError),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid slug: '{0}'")]
    InvalidSlug(String),

    #[error("Unknown discriminant '{value}' in column {column}")]
    UnknownDiscriminant { column: &'static str, value: String },
}
