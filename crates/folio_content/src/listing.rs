//! The listing layer: the engine's public read surface.
//!
//! Two entry points, both infallible: `get_item` returns at most one
//! resolved item, `query` returns a page. Filters are conjunctive; ordering
//! is allow-listed against the live column set; the total count runs
//! concurrently with the page select. Failures never escape - a broken
//! query degrades to `None` or an empty result with a warning.

use std::collections::{BTreeMap, HashSet};

use folio_db::{Filter, OrderDir, SelectQuery, SqlValue};
use folio_schema::{ContentKind, ContentTypeDefinition, FieldDefinition};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::context::{id_key, OwnerContext, OwnerKind, ResolveContext};
use crate::error::{ContentError, Result};
use crate::tables::TableRef;
use crate::{ContentEngine, JsonObject};

/// Which publication states a query sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    Published,
    Draft,
    All,
}

impl StatusFilter {
    /// The status column value to match, or `None` for no filtering.
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::Published => Some("published"),
            Self::Draft => Some("draft"),
            Self::All => None,
        }
    }
}

/// Relationship membership filter: keep items related to `value` through
/// `field`. `value` is a target slug, a target id, or an array of either;
/// `recursive` widens the target set to its whole descendant tree first.
#[derive(Debug, Clone)]
pub struct WhereRelated {
    pub field: String,
    pub value: JsonValue,
    pub recursive: bool,
}

impl WhereRelated {
    pub fn new(field: impl Into<String>, value: JsonValue) -> Self {
        Self {
            field: field.into(),
            value,
            recursive: false,
        }
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }
}

/// Options for `get_item` and `query`.
///
/// All filters combine conjunctively. `user` is a caller-side hint carried
/// through untouched; this layer does not enforce access.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub item_slug: Option<String>,
    pub item_id: Option<JsonValue>,
    pub parent_id: Option<JsonValue>,
    pub sibling_of: Option<JsonValue>,
    pub exclude_current: bool,
    pub status: StatusFilter,
    pub include_arrays_and_relations: bool,
    pub include_breadcrumbs: bool,
    pub include_authors: bool,
    pub order_by: Option<String>,
    pub order: OrderDir,
    pub group_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub where_related: Option<WhereRelated>,
    pub user: Option<JsonValue>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            item_slug: None,
            item_id: None,
            parent_id: None,
            sibling_of: None,
            exclude_current: true,
            status: StatusFilter::Published,
            include_arrays_and_relations: true,
            include_breadcrumbs: false,
            include_authors: false,
            order_by: None,
            order: OrderDir::Asc,
            group_by: None,
            limit: None,
            offset: None,
            where_related: None,
            user: None,
        }
    }
}

/// Pagination metadata, present when the caller set a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
    pub total: i64,
}

/// One resolved listing page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListResult {
    pub items: Vec<JsonValue>,
    pub total: i64,
    pub has_more: bool,
    pub pagination: Option<Pagination>,
    pub grouped: Option<BTreeMap<String, Vec<JsonValue>>>,
}

impl ListResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Properties replaced by embedded author records under `include_authors`.
const AUTHOR_FIELDS: [&str; 2] = ["author", "last_modified_by"];

impl ContentEngine {
    /// Fetch and resolve a single item, or `None`.
    ///
    /// `options.item_slug` / `options.item_id` select the row; a flat global
    /// needs neither. Never fails: anything broken degrades to `None`.
    pub async fn get_item(
        &self,
        kind: ContentKind,
        slug: &str,
        options: &QueryOptions,
    ) -> Option<JsonObject> {
        match self.get_item_inner(kind, slug, options).await {
            Ok(item) => item,
            Err(err) => {
                err.log_degraded("get_item");
                None
            }
        }
    }

    /// Fetch and resolve a listing page.
    ///
    /// Never fails: anything broken degrades to `ListResult::empty()`.
    pub async fn query(&self, kind: ContentKind, slug: &str, options: &QueryOptions) -> ListResult {
        match self.query_inner(kind, slug, options).await {
            Ok(result) => result,
            Err(err) => {
                err.log_degraded("query");
                ListResult::empty()
            }
        }
    }

    async fn get_item_inner(
        &self,
        kind: ContentKind,
        slug: &str,
        options: &QueryOptions,
    ) -> Result<Option<JsonObject>> {
        let (definition, table) = self.definition_and_table(kind, slug).await?;

        let mut query = SelectQuery::table(&table.name);
        if let Some(item_slug) = &options.item_slug {
            query = query.filter(Filter::Eq("slug".into(), SqlValue::from(item_slug.as_str())));
        }
        if let Some(item_id) = &options.item_id {
            query = query.filter(Filter::Eq("id".into(), SqlValue::from_json(item_id)));
        }
        if let Some(status) = options.status.as_str() {
            if table.has_column("status") {
                query = query.filter(Filter::Eq("status".into(), SqlValue::from(status)));
            }
        }

        let Some(row) = self.db.select_one(&query).await? else {
            return Ok(None);
        };

        let mut item = row.into_json();
        self.finish_item(&mut item, &definition, &table, options).await;
        Ok(Some(item))
    }

    async fn query_inner(
        &self,
        kind: ContentKind,
        slug: &str,
        options: &QueryOptions,
    ) -> Result<ListResult> {
        let (definition, table) = self.definition_and_table(kind, slug).await?;

        let filters = self.collect_filters(&definition, &table, options).await?;
        let mut query = SelectQuery::table(&table.name).filters(filters);

        if let Some(order_by) = &options.order_by {
            if table.has_column(order_by) {
                query = query.order_by(order_by, options.order);
            } else {
                debug!(column = %order_by, table = %table.name, "order column not present, skipped");
            }
        }
        if let Some(limit) = options.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = options.offset {
            query = query.offset(offset);
        }

        let (rows, total) = tokio::join!(self.db.select(&query), self.db.count(&query));
        let rows = rows?;
        let total = total?;

        let definition = &definition;
        let table = &table;
        let items = crate::fanout::resolve_ordered(rows, self.config.fan_out_limit, |row| {
            async move {
                let mut item = row.into_json();
                self.finish_item(&mut item, definition, table, options).await;
                JsonValue::Object(item)
            }
        })
        .await;

        let offset = options.offset.unwrap_or(0);
        let has_more = offset + (items.len() as i64) < total;
        let pagination = options.limit.map(|limit| Pagination {
            limit,
            offset,
            total,
        });
        let grouped = options.group_by.as_ref().map(|field| group_items(&items, field));

        Ok(ListResult {
            items,
            total,
            has_more,
            pagination,
            grouped,
        })
    }

    async fn definition_and_table(
        &self,
        kind: ContentKind,
        slug: &str,
    ) -> Result<(ContentTypeDefinition, TableRef)> {
        let definition = self
            .registry
            .definition(kind, slug)
            .await?
            .ok_or_else(|| ContentError::SchemaMissing {
                kind,
                slug: slug.to_string(),
            })?;

        let table = self
            .locator
            .locate(kind, slug)
            .await?
            .ok_or_else(|| {
                ContentError::TableMissing(format!("{}_{}", kind.as_str(), slug))
            })?;

        Ok((definition, table))
    }

    /// Assemble the conjunctive WHERE set for a listing.
    ///
    /// A filter that can already be proven empty (missing sibling row, no
    /// related owners) becomes an empty `IN`, which matches nothing.
    async fn collect_filters(
        &self,
        definition: &ContentTypeDefinition,
        table: &TableRef,
        options: &QueryOptions,
    ) -> Result<Vec<Filter>> {
        let mut filters = Vec::new();

        if let Some(item_slug) = &options.item_slug {
            filters.push(Filter::Eq("slug".into(), SqlValue::from(item_slug.as_str())));
        }
        if let Some(item_id) = &options.item_id {
            filters.push(Filter::Eq("id".into(), SqlValue::from_json(item_id)));
        }
        if let Some(status) = options.status.as_str() {
            if table.has_column("status") {
                filters.push(Filter::Eq("status".into(), SqlValue::from(status)));
            }
        }
        if let Some(parent_id) = &options.parent_id {
            filters.push(Filter::Eq("parent_id".into(), SqlValue::from_json(parent_id)));
        }
        if let Some(sibling_id) = &options.sibling_of {
            let sibling = self
                .sibling_filters(table, sibling_id, options.exclude_current)
                .await?;
            filters.extend(sibling);
        }
        if let Some(related) = &options.where_related {
            filters.push(self.related_owner_filter(definition, table, related).await?);
        }

        Ok(filters)
    }

    /// Siblings share the given row's `parent_id` (including NULL at the
    /// root level). A missing sibling row matches nothing.
    async fn sibling_filters(
        &self,
        table: &TableRef,
        sibling_id: &JsonValue,
        exclude: bool,
    ) -> Result<Vec<Filter>> {
        let query = SelectQuery::table(&table.name)
            .filter(Filter::Eq("id".into(), SqlValue::from_json(sibling_id)));
        let Some(row) = self.db.select_one(&query).await? else {
            debug!(table = %table.name, id = %id_key(sibling_id), "sibling row not found");
            return Ok(vec![match_nothing()]);
        };

        let mut filters = Vec::new();
        match row.raw("parent_id") {
            Some(value) if !value.is_null() => {
                filters.push(Filter::Eq("parent_id".into(), value.clone()));
            }
            Some(_) => filters.push(Filter::IsNull("parent_id".into())),
            // No hierarchy column: every row is a sibling.
            None => {}
        }
        if exclude {
            filters.push(Filter::Ne("id".into(), SqlValue::from_json(sibling_id)));
        }
        Ok(filters)
    }

    /// Turn a `where_related` option into an id filter on the owning table.
    async fn related_owner_filter(
        &self,
        definition: &ContentTypeDefinition,
        table: &TableRef,
        related: &WhereRelated,
    ) -> Result<Filter> {
        let Some(FieldDefinition::Relation {
            relation,
            target_kind,
            target_slug,
        }) = definition.field(&related.field)
        else {
            debug!(field = %related.field, "where_related on a non-relation field");
            return Ok(match_nothing());
        };

        let Some(target_table) = self.locator.locate(*target_kind, target_slug).await? else {
            debug!(field = %related.field, "where_related target table absent");
            return Ok(match_nothing());
        };

        let mut target_ids = self.target_ids(&target_table, &related.value).await?;
        if related.recursive {
            let mut seen: HashSet<String> = target_ids.iter().map(id_key).collect();
            let roots = target_ids.clone();
            for root in &roots {
                for descendant in self.descendant_ids(&target_table, root).await? {
                    if seen.insert(id_key(&descendant)) {
                        target_ids.push(descendant);
                    }
                }
            }
        }
        if target_ids.is_empty() {
            return Ok(match_nothing());
        }

        if relation.is_many() {
            let Some(junction) = self
                .locator
                .junction_table(&definition.slug, &related.field)
                .await?
            else {
                debug!(field = %related.field, "where_related junction table absent");
                return Ok(match_nothing());
            };
            let owner_column = OwnerKind::from_content_kind(definition.kind).junction_owner_column();
            if !junction.has_column(owner_column) || !junction.has_column("target_id") {
                debug!(table = %junction.name, "junction lacks expected key columns");
                return Ok(match_nothing());
            }

            let query = SelectQuery::table(&junction.name).filter(Filter::In(
                "target_id".into(),
                target_ids.iter().map(SqlValue::from_json).collect(),
            ));
            let mut owner_ids = Vec::new();
            let mut seen = HashSet::new();
            for row in self.db.select(&query).await? {
                let Some(owner_id) = row.raw(owner_column) else {
                    continue;
                };
                if owner_id.is_null() {
                    continue;
                }
                let json = owner_id.clone().into_json();
                if seen.insert(id_key(&json)) {
                    owner_ids.push(SqlValue::from_json(&json));
                }
            }
            Ok(Filter::In("id".into(), owner_ids))
        } else {
            // The owning row stores the target id in the field column.
            if !table.has_column(&related.field) {
                debug!(field = %related.field, "relation column not present on owner table");
                return Ok(match_nothing());
            }
            Ok(Filter::In(
                related.field.clone(),
                target_ids.iter().map(SqlValue::from_json).collect(),
            ))
        }
    }

    /// Map a `where_related.value` (slug, id, or array of either) to target
    /// table ids. Unknown slugs are skipped.
    async fn target_ids(&self, target: &TableRef, value: &JsonValue) -> Result<Vec<JsonValue>> {
        let values: Vec<&JsonValue> = match value {
            JsonValue::Array(elems) => elems.iter().collect(),
            other => vec![other],
        };

        let mut ids = Vec::new();
        for value in values {
            match value {
                JsonValue::String(slug) if target.has_column("slug") => {
                    let query = SelectQuery::table(&target.name)
                        .filter(Filter::Eq("slug".into(), SqlValue::from(slug.as_str())));
                    if let Some(row) = self.db.select_one(&query).await? {
                        if let Some(id) = row.raw("id") {
                            if !id.is_null() {
                                ids.push(id.clone().into_json());
                            }
                        }
                    } else {
                        debug!(table = %target.name, slug = %slug, "related target not found");
                    }
                }
                JsonValue::Null => {}
                other => ids.push(other.clone()),
            }
        }
        Ok(ids)
    }

    /// Run the per-item post-processing shared by both entry points.
    async fn finish_item(
        &self,
        item: &mut JsonObject,
        definition: &ContentTypeDefinition,
        table: &TableRef,
        options: &QueryOptions,
    ) {
        let owner = OwnerContext::root(definition.kind, &table.name, &definition.slug);
        let mut ctx = ResolveContext::new(options.include_arrays_and_relations);
        if let Some(id) = item.get("id").filter(|v| !v.is_null()) {
            ctx.mark_visited(definition.kind, &definition.slug, id);
        }

        self.resolve_item(item, &definition.fields, &owner, &ctx).await;

        if options.include_authors {
            self.embed_authors(item).await;
        }

        if options.include_breadcrumbs {
            let path = self.resolve_path(table, item, true).await;
            item.insert("url".to_string(), JsonValue::String(path.url));
            let crumbs =
                serde_json::to_value(&path.breadcrumbs).unwrap_or(JsonValue::Null);
            item.insert("breadcrumbs".to_string(), crumbs);
        }
    }

    /// Replace author id properties with safe author records.
    ///
    /// A missing users table or row leaves the raw id in place.
    async fn embed_authors(&self, item: &mut JsonObject) {
        for field in AUTHOR_FIELDS {
            let Some(id) = item.get(field) else { continue };
            if id.is_null() || id.is_object() {
                continue;
            }
            let id = id.clone();
            match self.author_record(&id).await {
                Ok(Some(author)) => {
                    item.insert(field.to_string(), JsonValue::Object(author));
                }
                Ok(None) => {}
                Err(err) => err.log_degraded("embed_authors"),
            }
        }
    }

    async fn author_record(&self, id: &JsonValue) -> Result<Option<JsonObject>> {
        let Some(users) = self.locator.locate(ContentKind::Collection, "users").await? else {
            return Ok(None);
        };

        let query = SelectQuery::table(&users.name)
            .filter(Filter::Eq("id".into(), SqlValue::from_json(id)));
        let Some(row) = self.db.select_one(&query).await? else {
            return Ok(None);
        };

        let mut author = row.into_json();
        author.retain(|key, _| !is_sensitive_column(key));
        Ok(Some(author))
    }
}

fn match_nothing() -> Filter {
    Filter::In("id".into(), Vec::new())
}

fn is_sensitive_column(name: &str) -> bool {
    const MARKERS: [&str; 5] = ["password", "secret", "token", "salt", "hash"];
    let name = name.to_ascii_lowercase();
    MARKERS.iter().any(|marker| name.contains(marker))
}

/// Bucket resolved items by a field value.
///
/// Scalar values bucket disjointly; an array-valued field (tags) fans the
/// item into every element's bucket. Null and missing values join no bucket.
fn group_items(items: &[JsonValue], field: &str) -> BTreeMap<String, Vec<JsonValue>> {
    let mut buckets: BTreeMap<String, Vec<JsonValue>> = BTreeMap::new();
    for item in items {
        match item.get(field) {
            Some(JsonValue::Array(elems)) => {
                for element in elems {
                    buckets
                        .entry(group_key(element))
                        .or_default()
                        .push(item.clone());
                }
            }
            Some(JsonValue::Null) | None => {}
            Some(value) => {
                buckets.entry(group_key(value)).or_default().push(item.clone());
            }
        }
    }
    buckets
}

/// Bucket key for one grouping value. Embedded records key by their slug,
/// name, or id, whichever is present first.
fn group_key(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Object(map) => ["slug", "name", "id"]
            .iter()
            .find_map(|key| match map.get(*key) {
                Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(JsonValue::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}
