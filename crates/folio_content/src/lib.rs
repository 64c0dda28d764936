//! Content resolution engine for Folio
//!
//! This crate turns flat rows from runtime-named content tables into fully
//! materialized object graphs: file ids become file records, array fields
//! pull in their side-table rows, relation fields embed their targets, and
//! listings add filtering, ordering, pagination, and grouping on top.
//!
//! Nothing here writes. The engine is the read path a request handler calls
//! after the schema and tables already exist, and it is deliberately hard to
//! break from the outside: a missing table, a dangling id, or a cyclic
//! parent chain degrades the affected field or item to a data-shaped empty
//! value instead of failing the request.
//!
//! # Usage
//!
//! ```rust,ignore
//! use folio_content::{ContentEngine, ContentKind, QueryOptions};
//! use folio_db::ContentDb;
//! use folio_schema::DbTypeRegistry;
//! use std::sync::Arc;
//!
//! let db = ContentDb::open("~/.folio/content.sqlite3").await?;
//! let registry = Arc::new(DbTypeRegistry::new(db.clone()).await?);
//! let engine = ContentEngine::new(db, registry);
//!
//! // One resolved item
//! let post = engine
//!     .get_item(ContentKind::Collection, "posts", &QueryOptions {
//!         item_slug: Some("hello-world".into()),
//!         ..QueryOptions::default()
//!     })
//!     .await;
//!
//! // A resolved page
//! let page = engine
//!     .query(ContentKind::Collection, "posts", &QueryOptions {
//!         limit: Some(10),
//!         ..QueryOptions::default()
//!     })
//!     .await;
//! ```

mod config;
mod context;
mod error;
mod fanout;
mod sources;
mod tables;

// Engine method implementations organized by resolution concern
mod arrays;
mod files;
mod hierarchy;
mod listing;
mod relations;
mod resolver;

pub use config::EngineConfig;
pub use context::{OwnerContext, OwnerKind, ResolveContext};
pub use error::{ContentError, Result};
pub use fanout::resolve_ordered;
pub use hierarchy::{Breadcrumb, ResolvedPath};
pub use listing::{ListResult, Pagination, QueryOptions, StatusFilter, WhereRelated};
pub use sources::{DbFileStore, DbTagSource, FileRef, FileStore, Tag, TagSource};
pub use tables::{TableLocator, TableRef};

pub use folio_db::{ContentDb, OrderDir};
pub use folio_schema::{
    Cardinality, ContentKind, ContentTypeDefinition, FieldDefinition, FieldMap, RelationKind,
    TypeRegistry,
};

use serde_json::Value as JsonValue;
use std::sync::Arc;

/// A content item in flight: one JSON property per column or resolved field.
pub type JsonObject = serde_json::Map<String, JsonValue>;

/// The content resolution engine.
///
/// Cheap to clone; all shared state sits behind the pool and `Arc`s. One
/// engine serves concurrent requests.
#[derive(Clone)]
pub struct ContentEngine {
    db: ContentDb,
    registry: Arc<dyn TypeRegistry>,
    files: Arc<dyn FileStore>,
    tags: Arc<dyn TagSource>,
    locator: TableLocator,
    config: EngineConfig,
}

impl ContentEngine {
    /// Build an engine over a database and a type registry.
    ///
    /// Files and tags default to the database-backed sources reading the
    /// conventional `files` / `tags` tables; swap them with the `with_`
    /// builders when they live elsewhere.
    pub fn new(db: ContentDb, registry: Arc<dyn TypeRegistry>) -> Self {
        let locator = TableLocator::new(db.clone());
        let files: Arc<dyn FileStore> = Arc::new(DbFileStore::new(db.clone()));
        let tags: Arc<dyn TagSource> = Arc::new(DbTagSource::new(db.clone()));
        Self {
            db,
            registry,
            files,
            tags,
            locator,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_file_store(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = files;
        self
    }

    pub fn with_tag_source(mut self, tags: Arc<dyn TagSource>) -> Self {
        self.tags = tags;
        self
    }

    /// The underlying database handle.
    pub fn db(&self) -> &ContentDb {
        &self.db
    }

    /// The table locator used for naming-convention lookups.
    pub fn locator(&self) -> &TableLocator {
        &self.locator
    }
}
