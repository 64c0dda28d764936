//! Table discovery by naming convention.
//!
//! Nothing about a content type's storage is declared anywhere; tables are
//! found by name at call time. Primary table `<kind>_<slug>`, side table
//! `<owner-table>_<field>`, junction `junction_<slug>_<field>` with a
//! singular-slug fallback. A table that isn't there is a normal outcome -
//! the field is simply empty - so every probe returns `Option`.

use crate::error::Result;
use folio_db::{safe_ident, ContentDb};
use folio_schema::ContentKind;
use tracing::debug;

/// A table that was actually found, with its probed column set.
///
/// Columns ride along so resolvers can check for `sort`, `status`, or an
/// owner-key column without a second round trip.
#[derive(Debug, Clone)]
pub struct TableRef {
    pub name: String,
    pub columns: Vec<String>,
}

impl TableRef {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Resolves convention-derived table names against the live database.
#[derive(Clone)]
pub struct TableLocator {
    db: ContentDb,
}

impl TableLocator {
    pub fn new(db: ContentDb) -> Self {
        Self { db }
    }

    /// Primary table for a content type: `<kind>_<slug>`.
    pub async fn locate(&self, kind: ContentKind, slug: &str) -> Result<Option<TableRef>> {
        self.probe(&format!("{}_{}", kind.as_str(), slug)).await
    }

    /// Side table for an array or file field: `<owner-table>_<field>`.
    pub async fn side_table(&self, owner_table: &str, field: &str) -> Result<Option<TableRef>> {
        self.probe(&format!("{}_{}", owner_table, field)).await
    }

    /// Junction table for a many-to-many field:
    /// `junction_<slug>_<field>`, falling back to the singular slug
    /// (trailing `s` trimmed).
    pub async fn junction_table(&self, slug: &str, field: &str) -> Result<Option<TableRef>> {
        if let Some(table) = self.probe(&format!("junction_{}_{}", slug, field)).await? {
            return Ok(Some(table));
        }

        match slug.strip_suffix('s') {
            Some(singular) if !singular.is_empty() => {
                self.probe(&format!("junction_{}_{}", singular, field)).await
            }
            _ => Ok(None),
        }
    }

    /// Probe one exact table name.
    ///
    /// Names that fail the identifier guard are treated as absent, not as
    /// errors: convention-derived names from hostile slugs must never reach
    /// SQL.
    pub async fn probe(&self, name: &str) -> Result<Option<TableRef>> {
        if safe_ident(name).is_err() {
            debug!(table = name, "rejected by identifier guard");
            return Ok(None);
        }

        if !self.db.table_exists(name).await? {
            debug!(table = name, "not present");
            return Ok(None);
        }

        let columns = self.db.table_columns(name).await?;
        Ok(Some(TableRef {
            name: name.to_string(),
            columns,
        }))
    }
}
