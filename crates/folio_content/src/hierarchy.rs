//! Hierarchy walking: URLs, breadcrumbs, and descendant sets.
//!
//! Items in a table with a `parent_id` column form trees. The ancestor
//! direction yields an item's URL path and breadcrumb trail; the child
//! direction yields the descendant id set used by recursive relationship
//! filters. Both directions track visited ids, so cyclic parent data
//! terminates instead of hanging: the path walk fails closed to the item's
//! own slug, the descendant walk simply stops expanding.

use std::collections::{HashSet, VecDeque};

use folio_db::{Filter, SelectQuery, SqlValue};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::context::id_key;
use crate::error::{ContentError, Result};
use crate::tables::TableRef;
use crate::{ContentEngine, JsonObject};

/// A resolved URL with its optional breadcrumb trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPath {
    pub url: String,
    pub breadcrumbs: Option<Vec<Breadcrumb>>,
}

/// One ancestor entry in a breadcrumb trail, root first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breadcrumb {
    pub label: String,
    pub url: String,
}

struct PathSegment {
    slug: String,
    label: String,
}

impl ContentEngine {
    /// Build the URL (and optionally breadcrumbs) for one item.
    ///
    /// Never fails: a cyclic parent chain or a query error collapses the
    /// result to the item's own slug with no breadcrumbs.
    pub async fn resolve_path(
        &self,
        table: &TableRef,
        item: &JsonObject,
        with_breadcrumbs: bool,
    ) -> ResolvedPath {
        let has_parent = table.has_column("parent_id")
            && item.get("parent_id").map(|v| !v.is_null()).unwrap_or(false);

        let segments = if has_parent {
            match self.ancestor_segments(table, item).await {
                Ok(segments) => segments,
                Err(err) => {
                    err.log_degraded("resolve_path");
                    let own = segment_of(item);
                    return ResolvedPath {
                        url: join_url(&self.config.base_path, &[own.slug.as_str()]),
                        breadcrumbs: None,
                    };
                }
            }
        } else {
            vec![segment_of(item)]
        };

        let slugs: Vec<&str> = segments.iter().map(|s| s.slug.as_str()).collect();
        let url = join_url(&self.config.base_path, &slugs);

        let breadcrumbs = with_breadcrumbs.then(|| {
            let mut trail = Vec::with_capacity(segments.len());
            let mut prefix: Vec<&str> = Vec::with_capacity(segments.len());
            for segment in &segments {
                prefix.push(segment.slug.as_str());
                trail.push(Breadcrumb {
                    label: segment.label.clone(),
                    url: join_url(&self.config.base_path, &prefix),
                });
            }
            trail
        });

        ResolvedPath { url, breadcrumbs }
    }

    /// Walk the parent chain upward, returning segments root first.
    ///
    /// A parent id that points at nothing ends the chain quietly; a parent
    /// id that points back into the chain is a cycle and errors out.
    async fn ancestor_segments(
        &self,
        table: &TableRef,
        item: &JsonObject,
    ) -> Result<Vec<PathSegment>> {
        let mut segments = vec![segment_of(item)];
        let mut visited = HashSet::new();
        if let Some(id) = item.get("id").filter(|v| !v.is_null()) {
            visited.insert(id_key(id));
        }

        let mut parent_ref = item.get("parent_id").cloned().unwrap_or(JsonValue::Null);
        while !parent_ref.is_null() {
            if !visited.insert(id_key(&parent_ref)) {
                return Err(ContentError::CycleDetected {
                    table: table.name.clone(),
                    id: id_key(&parent_ref),
                });
            }

            let query = SelectQuery::table(&table.name)
                .filter(Filter::Eq("id".into(), SqlValue::from_json(&parent_ref)));
            let Some(row) = self.db.select_one(&query).await? else {
                debug!(
                    table = %table.name,
                    parent_id = %id_key(&parent_ref),
                    "ancestor row missing, chain ends"
                );
                break;
            };

            let parent = row.into_json();
            segments.push(segment_of(&parent));
            parent_ref = parent.get("parent_id").cloned().unwrap_or(JsonValue::Null);
        }

        segments.reverse();
        Ok(segments)
    }

    /// All descendant ids of `root_id`, breadth first.
    ///
    /// A table without `parent_id` has no hierarchy, so the set is empty.
    pub async fn descendant_ids(
        &self,
        table: &TableRef,
        root_id: &JsonValue,
    ) -> Result<Vec<JsonValue>> {
        if !table.has_column("parent_id") {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        seen.insert(id_key(root_id));
        let mut queue = VecDeque::from([root_id.clone()]);
        let mut out = Vec::new();

        while let Some(current) = queue.pop_front() {
            let query = SelectQuery::table(&table.name)
                .filter(Filter::Eq("parent_id".into(), SqlValue::from_json(&current)));
            for row in self.db.select(&query).await? {
                let Some(id) = row.raw("id") else { continue };
                let id = id.clone().into_json();
                if id.is_null() || !seen.insert(id_key(&id)) {
                    continue;
                }
                queue.push_back(id.clone());
                out.push(id);
            }
        }

        Ok(out)
    }
}

fn segment_of(item: &JsonObject) -> PathSegment {
    let slug = match item.get("slug") {
        Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
        _ => item.get("id").map(id_key).unwrap_or_default(),
    };
    let label = ["title", "name", "label"]
        .iter()
        .find_map(|key| match item.get(*key) {
            Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_else(|| slug.clone());
    PathSegment { slug, label }
}

fn join_url(base: &str, slugs: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for slug in slugs {
        url.push('/');
        url.push_str(slug);
    }
    if url.is_empty() {
        url.push('/');
    }
    url
}
