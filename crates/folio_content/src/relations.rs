//! Relation field resolution.
//!
//! One-to-one and one-to-many relations live as a foreign-key value on the
//! owning row; many-to-many relations go through a junction table named
//! `junction_<slug>_<field>`. Resolved targets are full object graphs: a
//! hit fetches the target's definition from the registry and recurses.
//!
//! Relation graphs, unlike array nesting, are data-driven and can loop
//! (post A relates to post B relates back to A). Every branch carries the
//! visited set of the path above it plus a depth ceiling; on either trip,
//! the target row embeds unresolved. A partial graph, never a hang.

use crate::context::{id_key, OwnerContext, ResolveContext};
use crate::error::{ContentError, Result};
use crate::tables::TableRef;
use crate::{ContentEngine, JsonObject};
use folio_db::{Filter, JoinQuery, Row, SelectQuery, SqlValue};
use folio_schema::{ContentKind, RelationKind};
use serde_json::Value as JsonValue;
use tracing::debug;

impl ContentEngine {
    /// Resolve one relation field of `item`.
    pub(crate) async fn resolve_relation_field(
        &self,
        item: &JsonObject,
        field: &str,
        relation: RelationKind,
        target_kind: ContentKind,
        target_slug: &str,
        owner: &OwnerContext,
        ctx: &ResolveContext,
    ) -> Result<JsonValue> {
        match relation {
            RelationKind::OneToOne | RelationKind::OneToMany => {
                self.resolve_single_relation(item, field, target_kind, target_slug, ctx)
                    .await
            }
            RelationKind::ManyToMany => {
                self.resolve_many_relation(item, field, target_kind, target_slug, owner, ctx)
                    .await
            }
        }
    }

    async fn resolve_single_relation(
        &self,
        item: &JsonObject,
        field: &str,
        target_kind: ContentKind,
        target_slug: &str,
        ctx: &ResolveContext,
    ) -> Result<JsonValue> {
        let Some(raw) = item.get(field) else {
            return Ok(JsonValue::Null);
        };
        if raw.is_null() {
            return Ok(JsonValue::Null);
        }
        if raw.is_object() {
            return Ok(raw.clone());
        }

        let Some(target) = self.locator.locate(target_kind, target_slug).await? else {
            debug!(field, target_kind = %target_kind, target_slug, "target table missing");
            return Ok(JsonValue::Null);
        };

        match self.fetch_target_row(&target, field, raw).await {
            Ok(row) => {
                self.embed_target(row, target_kind, target_slug, &target, ctx)
                    .await
            }
            Err(err @ ContentError::ReferenceDangling { .. }) => {
                err.log_degraded("relation");
                Ok(JsonValue::Null)
            }
            Err(err) => Err(err),
        }
    }

    async fn fetch_target_row(
        &self,
        target: &TableRef,
        field: &str,
        id: &JsonValue,
    ) -> Result<Row> {
        let row = self
            .db
            .select_one(
                &SelectQuery::table(&target.name)
                    .filter(Filter::Eq("id".to_string(), SqlValue::from_json(id))),
            )
            .await?;

        row.ok_or_else(|| ContentError::ReferenceDangling {
            field: field.to_string(),
            id: id_key(id),
        })
    }

    async fn resolve_many_relation(
        &self,
        item: &JsonObject,
        field: &str,
        target_kind: ContentKind,
        target_slug: &str,
        owner: &OwnerContext,
        ctx: &ResolveContext,
    ) -> Result<JsonValue> {
        if let Some(value @ JsonValue::Array(elems)) = item.get(field) {
            if elems.first().map_or(false, JsonValue::is_object) {
                return Ok(value.clone());
            }
        }

        let Some(owner_id) = item.get("id").filter(|v| !v.is_null()) else {
            return Ok(JsonValue::Array(Vec::new()));
        };
        let Some(target) = self.locator.locate(target_kind, target_slug).await? else {
            debug!(field, target_slug, "target table missing");
            return Ok(JsonValue::Array(Vec::new()));
        };
        // Junction names always carry the root type's slug, also for
        // relation fields nested inside array blocks.
        let Some(junction) = self.locator.junction_table(&owner.type_slug, field).await? else {
            return Ok(JsonValue::Array(Vec::new()));
        };

        let owner_column = owner.kind.junction_owner_column();
        if !junction.has_column(owner_column) || !junction.has_column("target_id") {
            debug!(table = %junction.name, column = owner_column, "junction lacks expected columns");
            return Ok(JsonValue::Array(Vec::new()));
        }

        let mut join = JoinQuery::new(
            &junction.name,
            &target.name,
            owner_column,
            SqlValue::from_json(owner_id),
        );
        if junction.has_column("sort") {
            join = join.order_by_sort();
        }

        // Dangling junction rows fall out of the inner join here; the
        // resolved array shrinks by exactly that count.
        let rows = self.db.select_joined(&join).await?;

        let embedded = crate::fanout::resolve_ordered(rows, self.config.fan_out_limit, |row| {
            let ctx = ctx.clone();
            let target = target.clone();
            async move {
                self.embed_target(row, target_kind, target_slug, &target, &ctx)
                    .await
            }
        })
        .await;

        let mut targets = Vec::with_capacity(embedded.len());
        for result in embedded {
            targets.push(result?);
        }
        Ok(JsonValue::Array(targets))
    }

    /// Turn a fetched target row into its resolved object graph.
    ///
    /// Embeds the raw row instead of recursing when the target is already
    /// on the current path, the depth ceiling is hit, or the registry has
    /// no definition for it.
    pub(crate) async fn embed_target(
        &self,
        row: Row,
        target_kind: ContentKind,
        target_slug: &str,
        target: &TableRef,
        ctx: &ResolveContext,
    ) -> Result<JsonValue> {
        let obj = row.into_json();
        let id = obj.get("id").cloned().unwrap_or(JsonValue::Null);

        if ctx.depth() >= self.config.max_relation_depth {
            debug!(
                table = %target.name,
                depth = ctx.depth(),
                "depth ceiling reached, embedding unresolved"
            );
            return Ok(JsonValue::Object(obj));
        }
        if ctx.is_visited(target_kind, target_slug, &id) {
            debug!(table = %target.name, id = %id_key(&id), "target already on path, embedding unresolved");
            return Ok(JsonValue::Object(obj));
        }

        let Some(def) = self.registry.definition(target_kind, target_slug).await? else {
            debug!(target_slug, "no definition for target, embedding unresolved");
            return Ok(JsonValue::Object(obj));
        };

        let mut branch = ctx.descend();
        branch.mark_visited(target_kind, target_slug, &id);
        let target_owner = OwnerContext::root(target_kind, &target.name, target_slug);

        let mut obj = obj;
        self.resolve_item(&mut obj, &def.fields, &target_owner, &branch)
            .await;
        Ok(JsonValue::Object(obj))
    }
}
