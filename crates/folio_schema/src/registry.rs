//! Type registry: where the engine fetches definitions from.
//!
//! The engine takes the registry as an injected trait object and fetches a
//! fresh definition per call. It never caches: a definition changed between
//! two requests is picked up on the next one.

use crate::error::{Result, SchemaError};
use crate::types::{validate_slug, Cardinality, ContentKind, ContentTypeDefinition, FieldMap};
use async_trait::async_trait;
use chrono::Utc;
use folio_db::ContentDb;
use sqlx::Row as _;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Source of content type definitions.
#[async_trait]
pub trait TypeRegistry: Send + Sync {
    /// Fetch the definition for `(kind, slug)`, or `None` if the type is
    /// not defined.
    async fn definition(
        &self,
        kind: ContentKind,
        slug: &str,
    ) -> Result<Option<ContentTypeDefinition>>;
}

// ============================================================================
// SQLite-backed registry
// ============================================================================

/// Registry persisting definitions as JSON rows in the content database.
#[derive(Clone)]
pub struct DbTypeRegistry {
    db: ContentDb,
}

impl DbTypeRegistry {
    /// Create a registry over the given database, creating its table if
    /// missing.
    pub async fn new(db: ContentDb) -> Result<Self> {
        let registry = Self { db };
        registry.init_tables().await?;
        Ok(registry)
    }

    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS folio_types (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                slug TEXT NOT NULL,
                cardinality TEXT NOT NULL,
                fields_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(kind, slug)
            )
            "#,
        )
        .execute(self.db.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_folio_types_slug ON folio_types(kind, slug)",
        )
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Insert or update a definition, keyed by `(kind, slug)`.
    pub async fn save_definition(&self, def: &ContentTypeDefinition) -> Result<()> {
        validate_slug(&def.slug)?;
        let fields_json = serde_json::to_string(&def.fields)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO folio_types (id, kind, slug, cardinality, fields_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind, slug) DO UPDATE SET
                cardinality = excluded.cardinality,
                fields_json = excluded.fields_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(def.kind.as_str())
        .bind(def.slug.as_str())
        .bind(def.cardinality.as_str())
        .bind(fields_json)
        .bind(&now)
        .bind(&now)
        .execute(self.db.pool())
        .await?;

        debug!(kind = %def.kind, slug = %def.slug, "Definition saved");
        Ok(())
    }

    /// Remove a definition. Returns whether one existed.
    pub async fn delete_definition(&self, kind: ContentKind, slug: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM folio_types WHERE kind = ? AND slug = ?")
            .bind(kind.as_str())
            .bind(slug)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All definitions, collections first, then by slug.
    pub async fn list_definitions(&self) -> Result<Vec<ContentTypeDefinition>> {
        let rows = sqlx::query(
            "SELECT kind, slug, cardinality, fields_json FROM folio_types ORDER BY kind, slug",
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_definition).collect()
    }
}

#[async_trait]
impl TypeRegistry for DbTypeRegistry {
    async fn definition(
        &self,
        kind: ContentKind,
        slug: &str,
    ) -> Result<Option<ContentTypeDefinition>> {
        let row = sqlx::query(
            "SELECT kind, slug, cardinality, fields_json FROM folio_types WHERE kind = ? AND slug = ? LIMIT 1",
        )
        .bind(kind.as_str())
        .bind(slug)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(row_to_definition).transpose()
    }
}

fn row_to_definition(row: &sqlx::sqlite::SqliteRow) -> Result<ContentTypeDefinition> {
    let kind_raw: String = row.try_get("kind")?;
    let kind = ContentKind::parse(&kind_raw).ok_or(SchemaError::UnknownDiscriminant {
        column: "kind",
        value: kind_raw,
    })?;

    let cardinality_raw: String = row.try_get("cardinality")?;
    let cardinality =
        Cardinality::parse(&cardinality_raw).ok_or(SchemaError::UnknownDiscriminant {
            column: "cardinality",
            value: cardinality_raw,
        })?;

    let fields_json: String = row.try_get("fields_json")?;
    let fields: FieldMap = serde_json::from_str(&fields_json)?;

    Ok(ContentTypeDefinition {
        slug: row.try_get("slug")?,
        kind,
        cardinality,
        fields,
    })
}

// ============================================================================
// In-memory registry
// ============================================================================

/// Registry backed by a plain map. Useful for fixtures and for callers that
/// load definitions from configuration rather than the database.
#[derive(Default)]
pub struct MemoryTypeRegistry {
    types: RwLock<HashMap<(ContentKind, String), ContentTypeDefinition>>,
}

impl MemoryTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a definition.
    pub fn insert(&self, def: ContentTypeDefinition) {
        let mut types = self.types.write().unwrap_or_else(|e| e.into_inner());
        types.insert((def.kind, def.slug.clone()), def);
    }
}

#[async_trait]
impl TypeRegistry for MemoryTypeRegistry {
    async fn definition(
        &self,
        kind: ContentKind,
        slug: &str,
    ) -> Result<Option<ContentTypeDefinition>> {
        let types = self.types.read().unwrap_or_else(|e| e.into_inner());
        Ok(types.get(&(kind, slug.to_string())).cloned())
    }
}
