//! The resolver composition.
//!
//! `resolve_item` is the heart of the engine: it takes one flat row and a
//! field map and mutates the row into its materialized object graph. One
//! pass per resolver family - files, then arrays, then relations, then tag
//! enrichment - with sibling fields inside a pass fanned out concurrently.
//!
//! Every field is individually shielded: a failure degrades that field to
//! its tag's empty value and the siblings never notice.

use crate::context::{id_key, OwnerContext, ResolveContext};
use crate::{ContentEngine, JsonObject};
use folio_schema::{ContentKind, FieldDefinition, FieldMap, RelationKind};
use futures::future::BoxFuture;
use serde_json::Value as JsonValue;
use tracing::warn;

impl ContentEngine {
    /// Resolve every field of `item` in place.
    ///
    /// Boxed because resolution is mutually recursive: array rows and
    /// relation targets re-enter it with their own field maps. This never
    /// fails; broken fields degrade individually.
    pub fn resolve_item<'a>(
        &'a self,
        item: &'a mut JsonObject,
        fields: &'a FieldMap,
        owner: &'a OwnerContext,
        ctx: &'a ResolveContext,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.resolve_item_inner(item, fields, owner, ctx))
    }

    async fn resolve_item_inner(
        &self,
        item: &mut JsonObject,
        fields: &FieldMap,
        owner: &OwnerContext,
        ctx: &ResolveContext,
    ) {
        let item_id = item.get("id").cloned().unwrap_or(JsonValue::Null);

        normalize_scalars(item, fields);

        // Files resolve even when arrays/relations are switched off.
        let file_fields: Vec<(String, bool, JsonValue)> = fields
            .iter()
            .filter_map(|(name, def)| match def {
                FieldDefinition::File { multiple } => {
                    Some((name.clone(), *multiple, def.empty_value()))
                }
                _ => None,
            })
            .collect();
        if !file_fields.is_empty() {
            let snapshot = item.clone();
            let resolved = crate::fanout::resolve_ordered(
                file_fields,
                self.config.fan_out_limit,
                |(name, multiple, empty)| {
                    let snapshot = &snapshot;
                    async move {
                        let result = self
                            .resolve_file_field(snapshot, &name, multiple, owner, true)
                            .await;
                        (name, empty, result)
                    }
                },
            )
            .await;
            for (name, empty, result) in resolved {
                let value = unwrap_or_degrade(result, &name, owner, &item_id, empty);
                item.insert(name, value);
            }
        }

        if ctx.with_arrays_and_relations() {
            let array_fields: Vec<(String, FieldMap)> = fields
                .iter()
                .filter_map(|(name, def)| match def {
                    FieldDefinition::Array { item_fields } => {
                        Some((name.clone(), item_fields.clone()))
                    }
                    _ => None,
                })
                .collect();
            if !array_fields.is_empty() {
                let snapshot = item.clone();
                let resolved = crate::fanout::resolve_ordered(
                    array_fields,
                    self.config.fan_out_limit,
                    |(name, item_fields)| {
                        let snapshot = &snapshot;
                        async move {
                            let result = self
                                .resolve_array_field(snapshot, &name, &item_fields, owner, ctx)
                                .await;
                            (name, result)
                        }
                    },
                )
                .await;
                for (name, result) in resolved {
                    let value = unwrap_or_degrade(
                        result.map(JsonValue::Array),
                        &name,
                        owner,
                        &item_id,
                        JsonValue::Array(Vec::new()),
                    );
                    item.insert(name, value);
                }
            }

            let relation_fields: Vec<(String, RelationKind, ContentKind, String, JsonValue)> =
                fields
                    .iter()
                    .filter_map(|(name, def)| match def {
                        FieldDefinition::Relation {
                            relation,
                            target_kind,
                            target_slug,
                        } => Some((
                            name.clone(),
                            *relation,
                            *target_kind,
                            target_slug.clone(),
                            def.empty_value(),
                        )),
                        _ => None,
                    })
                    .collect();
            if !relation_fields.is_empty() {
                let snapshot = item.clone();
                let resolved = crate::fanout::resolve_ordered(
                    relation_fields,
                    self.config.fan_out_limit,
                    |(name, relation, target_kind, target_slug, empty)| {
                        let snapshot = &snapshot;
                        async move {
                            let result = self
                                .resolve_relation_field(
                                    snapshot,
                                    &name,
                                    relation,
                                    target_kind,
                                    &target_slug,
                                    owner,
                                    ctx,
                                )
                                .await;
                            (name, empty, result)
                        }
                    },
                )
                .await;
                for (name, empty, result) in resolved {
                    let value = unwrap_or_degrade(result, &name, owner, &item_id, empty);
                    item.insert(name, value);
                }
            }
        }

        self.enrich_tags(item, fields, owner).await;
    }

    /// Fill empty `tags` fields from the tag registry.
    ///
    /// A non-empty stored value always wins; the registry is enrichment,
    /// not the source of truth.
    async fn enrich_tags(&self, item: &mut JsonObject, fields: &FieldMap, owner: &OwnerContext) {
        let tag_fields: Vec<String> = fields
            .iter()
            .filter_map(|(name, def)| match def {
                FieldDefinition::Tags => Some(name.clone()),
                _ => None,
            })
            .collect();

        for name in tag_fields {
            // Tag lists persisted as JSON text become real arrays first.
            let stored_text = match item.get(&name) {
                Some(JsonValue::String(s)) => Some(s.clone()),
                _ => None,
            };
            if let Some(text) = stored_text {
                if let Ok(parsed) = serde_json::from_str::<JsonValue>(&text) {
                    if parsed.is_array() {
                        item.insert(name.clone(), parsed);
                    }
                }
            }

            if !tag_value_is_empty(item.get(&name)) {
                continue;
            }

            let Some(entity_id) = item.get("id").filter(|v| !v.is_null()).cloned() else {
                item.insert(name, JsonValue::Array(Vec::new()));
                continue;
            };

            let tags = self.tags.tags_for_entity(&owner.type_slug, &entity_id).await;
            let value =
                serde_json::to_value(&tags).unwrap_or_else(|_| JsonValue::Array(Vec::new()));
            item.insert(name, value);
        }
    }
}

fn unwrap_or_degrade(
    result: crate::error::Result<JsonValue>,
    field: &str,
    owner: &OwnerContext,
    parent_id: &JsonValue,
    empty: JsonValue,
) -> JsonValue {
    match result {
        Ok(value) => value,
        Err(err) => {
            warn!(
                field,
                table = %owner.table,
                parent_id = %id_key(parent_id),
                error = %err,
                "field degraded to empty value"
            );
            empty
        }
    }
}

/// SQLite hands booleans back as 0/1; the field tag says what they are.
fn normalize_scalars(item: &mut JsonObject, fields: &FieldMap) {
    for (name, def) in fields {
        if matches!(def, FieldDefinition::Boolean) {
            if let Some(JsonValue::Number(n)) = item.get(name) {
                if let Some(i) = n.as_i64() {
                    item.insert(name.clone(), JsonValue::Bool(i != 0));
                }
            }
        }
    }
}

fn tag_value_is_empty(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => true,
        Some(JsonValue::Array(elems)) => elems.is_empty(),
        Some(JsonValue::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_db::ContentDb;
    use folio_schema::MemoryTypeRegistry;
    use serde_json::json;
    use std::sync::Arc;

    fn fields(defs: Vec<(&str, FieldDefinition)>) -> FieldMap {
        defs.into_iter()
            .map(|(name, def)| (name.to_string(), def))
            .collect()
    }

    fn posts_owner() -> OwnerContext {
        OwnerContext::root(ContentKind::Collection, "collection_posts", "posts")
    }

    #[tokio::test]
    async fn test_boolean_normalization() {
        let db = ContentDb::in_memory().await.unwrap();
        let engine = ContentEngine::new(db, Arc::new(MemoryTypeRegistry::new()));

        let mut item = json!({"id": 1, "featured": 1, "hidden": 0})
            .as_object()
            .unwrap()
            .clone();
        let defs = fields(vec![
            ("featured", FieldDefinition::Boolean),
            ("hidden", FieldDefinition::Boolean),
        ]);

        engine
            .resolve_item(&mut item, &defs, &posts_owner(), &ResolveContext::new(true))
            .await;

        assert_eq!(item["featured"], json!(true));
        assert_eq!(item["hidden"], json!(false));
    }

    #[tokio::test]
    async fn test_tags_json_text_becomes_array() {
        let db = ContentDb::in_memory().await.unwrap();
        let engine = ContentEngine::new(db, Arc::new(MemoryTypeRegistry::new()));

        let mut item = json!({"id": 1, "keywords": "[\"alpha\",\"beta\"]"})
            .as_object()
            .unwrap()
            .clone();
        let defs = fields(vec![("keywords", FieldDefinition::Tags)]);

        engine
            .resolve_item(&mut item, &defs, &posts_owner(), &ResolveContext::new(true))
            .await;

        assert_eq!(item["keywords"], json!(["alpha", "beta"]));
    }

    #[tokio::test]
    async fn test_empty_tags_enriched_from_registry() {
        let db = ContentDb::in_memory().await.unwrap();
        sqlx::query("CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT, slug TEXT)")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE tag_entities (id INTEGER PRIMARY KEY, tag_id INTEGER, entity_type TEXT, entity_id TEXT)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query("INSERT INTO tags (id, name, slug) VALUES (1, 'Featured', 'featured')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO tag_entities (tag_id, entity_type, entity_id) VALUES (1, 'posts', '1')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let engine = ContentEngine::new(db, Arc::new(MemoryTypeRegistry::new()));
        let mut item = json!({"id": 1, "keywords": null})
            .as_object()
            .unwrap()
            .clone();
        let defs = fields(vec![("keywords", FieldDefinition::Tags)]);

        engine
            .resolve_item(&mut item, &defs, &posts_owner(), &ResolveContext::new(true))
            .await;

        let tags = item["keywords"].as_array().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0]["name"], "Featured");
    }

    #[tokio::test]
    async fn test_stored_tags_not_overwritten() {
        let db = ContentDb::in_memory().await.unwrap();
        let engine = ContentEngine::new(db, Arc::new(MemoryTypeRegistry::new()));

        let mut item = json!({"id": 1, "keywords": ["kept"]})
            .as_object()
            .unwrap()
            .clone();
        let defs = fields(vec![("keywords", FieldDefinition::Tags)]);

        engine
            .resolve_item(&mut item, &defs, &posts_owner(), &ResolveContext::new(true))
            .await;

        assert_eq!(item["keywords"], json!(["kept"]));
    }

    #[tokio::test]
    async fn test_every_field_degrades_when_database_is_gone() {
        let db = ContentDb::in_memory().await.unwrap();
        let engine = ContentEngine::new(db.clone(), Arc::new(MemoryTypeRegistry::new()));
        // Kill the pool under the engine: every query now fails.
        db.close().await;

        let mut item = json!({"id": 1, "title": "still here"})
            .as_object()
            .unwrap()
            .clone();
        let defs = fields(vec![
            ("cover", FieldDefinition::File { multiple: false }),
            ("gallery", FieldDefinition::File { multiple: true }),
            (
                "sections",
                FieldDefinition::Array {
                    item_fields: FieldMap::new(),
                },
            ),
            (
                "related",
                FieldDefinition::Relation {
                    relation: RelationKind::ManyToMany,
                    target_kind: ContentKind::Collection,
                    target_slug: "posts".to_string(),
                },
            ),
        ]);

        engine
            .resolve_item(&mut item, &defs, &posts_owner(), &ResolveContext::new(true))
            .await;

        // Data-shaped defaults all around; untouched fields survive.
        assert_eq!(item["title"], "still here");
        assert_eq!(item["cover"], JsonValue::Null);
        assert_eq!(item["gallery"], json!([]));
        assert_eq!(item["sections"], json!([]));
        assert_eq!(item["related"], json!([]));
    }
}
