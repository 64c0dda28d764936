//! Resolution errors.
//!
//! These exist for the internals: public entry points never surface them.
//! Failures recover as close to their origin as possible - a broken field
//! degrades to its tag's empty value, a broken item never aborts its
//! siblings, and the top level degrades to `None` or an empty result.

use folio_schema::ContentKind;
use thiserror::Error;
use tracing::{debug, warn};

pub type Result<T> = std::result::Result<T, ContentError>;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("No definition for {kind} '{slug}'")]
    SchemaMissing { kind: ContentKind, slug: String },

    #[error("Table '{0}' does not exist")]
    TableMissing(String),

    #[error("Dangling reference in '{field}': {id}")]
    ReferenceDangling { field: String, id: String },

    #[error("Query failed: {0}")]
    QueryFailure(#[from] folio_db::DbError),

    #[error("Cycle detected in '{table}' at id {id}")]
    CycleDetected { table: String, id: String },

    #[error("Schema error: {0}")]
    Schema(#[from] folio_schema::SchemaError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ContentError {
    /// Log a degraded operation at the level its class calls for.
    ///
    /// A missing table is the normal "field has no storage yet" outcome and
    /// stays at debug; everything else that forces degradation is warned.
    pub(crate) fn log_degraded(&self, operation: &str) {
        match self {
            ContentError::TableMissing(_) | ContentError::ReferenceDangling { .. } => {
                debug!(operation, error = %self, "degraded to empty result");
            }
            _ => {
                warn!(operation, error = %self, "degraded to empty result");
            }
        }
    }
}
