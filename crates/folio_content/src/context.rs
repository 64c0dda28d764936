//! Resolution contexts threaded through the resolver passes.

use folio_schema::ContentKind;
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Who owns the rows being resolved: a top-level content item or an array
/// block row nested inside one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    Collection,
    Global,
    /// An array side-table row. Its own nested side storage keys by
    /// `parent_id`; junctions it owns key by `block_id`.
    Block,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Global => "global",
            Self::Block => "block",
        }
    }

    pub fn from_content_kind(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Collection => Self::Collection,
            ContentKind::Global => Self::Global,
        }
    }

    /// Owner-key column in side tables (arrays, file references).
    ///
    /// The kind-specific column applies at the root; one nesting level down
    /// the convention switches to the generic `parent_id`.
    pub fn side_owner_column(&self) -> &'static str {
        match self {
            Self::Collection => "collection_id",
            Self::Global => "global_id",
            Self::Block => "parent_id",
        }
    }

    /// Owner-key column in junction tables. Blocks keep their own
    /// discriminated column here, unlike side tables.
    pub fn junction_owner_column(&self) -> &'static str {
        match self {
            Self::Collection => "collection_id",
            Self::Global => "global_id",
            Self::Block => "block_id",
        }
    }
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The row that owns the fields currently being resolved.
#[derive(Debug, Clone)]
pub struct OwnerContext {
    pub kind: OwnerKind,
    /// Table the owning row lives in. Side-table names are derived from it.
    pub table: String,
    /// Slug of the root content type. Junction names keep it even for
    /// fields nested inside blocks.
    pub type_slug: String,
}

impl OwnerContext {
    /// Context for a top-level content item.
    pub fn root(kind: ContentKind, table: impl Into<String>, type_slug: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::from_content_kind(kind),
            table: table.into(),
            type_slug: type_slug.into(),
        }
    }

    /// Context for rows of an array side table, owned by `side_table` rows.
    pub fn block(&self, side_table: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::Block,
            table: side_table.into(),
            type_slug: self.type_slug.clone(),
        }
    }
}

/// Canonical key for an opaque id value.
///
/// SQLite hands back integers or text depending on column affinity; `4` and
/// `"4"` must compare equal for cycle tracking.
pub fn id_key(id: &JsonValue) -> String {
    match id {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Per-branch recursion state.
///
/// Cloned at every descent, so the visited set tracks the path from the
/// root, not the whole traversal: two branches may legitimately embed the
/// same target without either seeing a false cycle.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    depth: usize,
    visited: HashSet<(ContentKind, String, String)>,
    with_arrays_and_relations: bool,
}

impl ResolveContext {
    pub fn new(with_arrays_and_relations: bool) -> Self {
        Self {
            depth: 0,
            visited: HashSet::new(),
            with_arrays_and_relations,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn with_arrays_and_relations(&self) -> bool {
        self.with_arrays_and_relations
    }

    /// One level deeper, same path history.
    pub fn descend(&self) -> Self {
        let mut next = self.clone();
        next.depth += 1;
        next
    }

    pub fn mark_visited(&mut self, kind: ContentKind, slug: &str, id: &JsonValue) {
        self.visited.insert((kind, slug.to_string(), id_key(id)));
    }

    pub fn is_visited(&self, kind: ContentKind, slug: &str, id: &JsonValue) -> bool {
        self.visited
            .contains(&(kind, slug.to_string(), id_key(id)))
    }
}
