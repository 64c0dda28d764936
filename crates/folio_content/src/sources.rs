//! External collaborators: the file store and the tag registry.
//!
//! Both are enrichment-only. The engine consults them to promote stored
//! identifiers into records; if either is unavailable or a lookup fails,
//! the affected value degrades and resolution carries on.

use crate::context::id_key;
use async_trait::async_trait;
use folio_db::{ContentDb, Filter, SelectQuery, SqlValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A materialized file record, the resolved form of a file field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: JsonValue,
    pub url: String,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub name: Option<String>,
    pub alt: Option<String>,
    pub title: Option<String>,
}

/// A tag from the external tag registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: JsonValue,
    pub name: String,
    pub slug: Option<String>,
}

/// Concurrency bound for stores that can only look files up one at a time.
const LOOKUP_FAN_OUT: usize = 8;

/// Source of file records.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Look up a single file. `None` covers both "not found" and "store
    /// unavailable".
    async fn file(&self, id: &JsonValue) -> Option<FileRef>;

    /// Batch lookup. Results come back in request order; ids that resolve
    /// to nothing are dropped. Stores with a real batch path should
    /// override this; the default fans out single lookups.
    async fn files(&self, ids: &[JsonValue]) -> Vec<FileRef> {
        let found = crate::fanout::resolve_ordered(ids.to_vec(), LOOKUP_FAN_OUT, |id| async move {
            self.file(&id).await
        })
        .await;
        found.into_iter().flatten().collect()
    }
}

/// Source of entity tags.
#[async_trait]
pub trait TagSource: Send + Sync {
    async fn tags_for_entity(&self, entity_type: &str, entity_id: &JsonValue) -> Vec<Tag>;
}

// ============================================================================
// Database-backed implementations
// ============================================================================

/// File store reading the conventional `files` table.
#[derive(Clone)]
pub struct DbFileStore {
    db: ContentDb,
}

impl DbFileStore {
    pub fn new(db: ContentDb) -> Self {
        Self { db }
    }

    async fn lookup(&self, ids: &[JsonValue]) -> crate::error::Result<Vec<FileRef>> {
        if !self.db.table_exists("files").await? {
            debug!("files table not present");
            return Ok(Vec::new());
        }

        let values: Vec<SqlValue> = ids.iter().map(SqlValue::from_json).collect();
        let rows = self
            .db
            .select(&SelectQuery::table("files").filter(Filter::In("id".into(), values)))
            .await?;

        let by_id: HashMap<String, FileRef> = rows
            .into_iter()
            .map(|row| {
                let file = file_from_columns(row.into_json());
                (id_key(&file.id), file)
            })
            .collect();

        // Re-emit in request order; unresolved ids drop out here. A repeated
        // id gets its record at every position.
        Ok(ids
            .iter()
            .filter_map(|id| by_id.get(&id_key(id)).cloned())
            .collect())
    }
}

#[async_trait]
impl FileStore for DbFileStore {
    async fn file(&self, id: &JsonValue) -> Option<FileRef> {
        self.files(std::slice::from_ref(id)).await.into_iter().next()
    }

    async fn files(&self, ids: &[JsonValue]) -> Vec<FileRef> {
        if ids.is_empty() {
            return Vec::new();
        }
        match self.lookup(ids).await {
            Ok(files) => files,
            Err(err) => {
                warn!(error = %err, "file lookup failed");
                Vec::new()
            }
        }
    }
}

fn file_from_columns(mut columns: JsonMap<String, JsonValue>) -> FileRef {
    FileRef {
        id: columns.remove("id").unwrap_or(JsonValue::Null),
        url: take_string(&mut columns, "url").unwrap_or_default(),
        mime_type: take_string(&mut columns, "mime_type"),
        size: columns.remove("size").and_then(|v| v.as_i64()),
        name: take_string(&mut columns, "name"),
        alt: take_string(&mut columns, "alt"),
        title: take_string(&mut columns, "title"),
    }
}

fn take_string(columns: &mut JsonMap<String, JsonValue>, key: &str) -> Option<String> {
    match columns.remove(key) {
        Some(JsonValue::String(s)) => Some(s),
        _ => None,
    }
}

/// Tag source reading the conventional `tags` + `tag_entities` tables.
#[derive(Clone)]
pub struct DbTagSource {
    db: ContentDb,
}

impl DbTagSource {
    pub fn new(db: ContentDb) -> Self {
        Self { db }
    }

    async fn lookup(
        &self,
        entity_type: &str,
        entity_id: &JsonValue,
    ) -> crate::error::Result<Vec<Tag>> {
        for table in ["tags", "tag_entities"] {
            if !self.db.table_exists(table).await? {
                debug!(table, "tag table not present");
                return Ok(Vec::new());
            }
        }

        let memberships = self
            .db
            .select(
                &SelectQuery::table("tag_entities")
                    .filter(Filter::Eq(
                        "entity_type".into(),
                        SqlValue::from(entity_type),
                    ))
                    .filter(Filter::Eq("entity_id".into(), SqlValue::from_json(entity_id))),
            )
            .await?;

        let tag_ids: Vec<JsonValue> = memberships
            .into_iter()
            .filter_map(|row| {
                let mut columns = row.into_json();
                columns.remove("tag_id")
            })
            .collect();

        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<SqlValue> = tag_ids.iter().map(SqlValue::from_json).collect();
        let rows = self
            .db
            .select(&SelectQuery::table("tags").filter(Filter::In("id".into(), values)))
            .await?;

        let by_id: HashMap<String, Tag> = rows
            .into_iter()
            .map(|row| {
                let mut columns = row.into_json();
                let tag = Tag {
                    id: columns.remove("id").unwrap_or(JsonValue::Null),
                    name: take_string(&mut columns, "name").unwrap_or_default(),
                    slug: take_string(&mut columns, "slug"),
                };
                (id_key(&tag.id), tag)
            })
            .collect();

        // Membership order wins, same as the file store.
        Ok(tag_ids
            .iter()
            .filter_map(|id| by_id.get(&id_key(id)).cloned())
            .collect())
    }
}

#[async_trait]
impl TagSource for DbTagSource {
    async fn tags_for_entity(&self, entity_type: &str, entity_id: &JsonValue) -> Vec<Tag> {
        match self.lookup(entity_type, entity_id).await {
            Ok(tags) => tags,
            Err(err) => {
                warn!(entity_type, error = %err, "tag lookup failed");
                Vec::new()
            }
        }
    }
}
