//! Content type definitions.
//!
//! A content type is defined at runtime by site authors; the engine never
//! knows field layouts at compile time. Definitions are immutable snapshots:
//! the registry hands out a fresh copy per call and resolution never mutates
//! one.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Field name → definition, in deterministic order.
pub type FieldMap = BTreeMap<String, FieldDefinition>;

// ============================================================================
// Discriminant enums
// ============================================================================

/// The two families of content types.
///
/// Collections hold many addressable items (posts, pages); globals hold
/// site-wide singletons or small repeated blocks (navigation, footer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Collection,
    Global,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Global => "global",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "collection" => Some(Self::Collection),
            "global" => Some(Self::Global),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a type stores exactly one row or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// A single row; lookups need no discriminating filter.
    Flat,
    /// Many rows addressed by slug or id.
    Repeatable,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Repeatable => "repeatable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "flat" => Some(Self::Flat),
            "repeatable" => Some(Self::Repeatable),
            _ => None,
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relation shape between an owning type and its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Foreign-key column on the owner, one target.
    OneToOne,
    /// Foreign-key column on the owner pointing into a repeatable target.
    OneToMany,
    /// Junction table between owner and target.
    ManyToMany,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToMany => "many_to_many",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "one_to_one" => Some(Self::OneToOne),
            "one_to_many" => Some(Self::OneToMany),
            "many_to_many" => Some(Self::ManyToMany),
            _ => None,
        }
    }

    /// Whether the resolved value is a list rather than a single object.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::ManyToMany)
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Field definitions
// ============================================================================

/// One field of a content type.
///
/// This union is closed: the resolved JSON shape of every field is fully
/// determined by its tag, so resolvers can dispatch without probing storage
/// first. Unknown tags fail deserialization instead of passing through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldDefinition {
    /// Plain text stored inline.
    String,
    /// Numeric value stored inline.
    Number,
    /// Boolean stored inline (SQLite integer 0/1).
    Boolean,
    /// One value out of an author-defined set, stored inline as text.
    Select,
    /// Tag list; stored inline as JSON or enriched from the tag registry.
    Tags,
    /// Rich text document stored inline as serialized markup.
    RichText,
    /// Reference(s) into the file store.
    File {
        #[serde(default)]
        multiple: bool,
    },
    /// Repeatable block of sub-fields stored in a side table.
    Array { item_fields: FieldMap },
    /// Link to another content type.
    Relation {
        relation: RelationKind,
        target_kind: ContentKind,
        target_slug: String,
    },
}

impl FieldDefinition {
    /// The value a field degrades to when its storage is absent or broken.
    ///
    /// Shapes match the resolved form: list-shaped fields degrade to an
    /// empty array, everything else to null. Consumers can rely on the
    /// shape without distinguishing "resolved empty" from "degraded".
    pub fn empty_value(&self) -> JsonValue {
        match self {
            Self::Tags => JsonValue::Array(Vec::new()),
            Self::File { multiple: true } => JsonValue::Array(Vec::new()),
            Self::Array { .. } => JsonValue::Array(Vec::new()),
            Self::Relation { relation, .. } if relation.is_many() => {
                JsonValue::Array(Vec::new())
            }
            _ => JsonValue::Null,
        }
    }

    /// Whether this field is stored outside the primary table.
    pub fn uses_side_storage(&self) -> bool {
        matches!(
            self,
            Self::File { .. } | Self::Array { .. } | Self::Relation { .. }
        )
    }
}

// ============================================================================
// Content type definition
// ============================================================================

/// A complete content type: identity plus its field layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTypeDefinition {
    /// Lowercase identifier, also the table-name stem (`collection_<slug>`).
    pub slug: String,

    /// Collection or global.
    pub kind: ContentKind,

    /// Single row or many.
    pub cardinality: Cardinality,

    /// Field name → definition.
    #[serde(default)]
    pub fields: FieldMap,
}

impl ContentTypeDefinition {
    /// A repeatable collection type.
    pub fn collection(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            kind: ContentKind::Collection,
            cardinality: Cardinality::Repeatable,
            fields: FieldMap::new(),
        }
    }

    /// A flat (single-row) global type.
    pub fn global(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            kind: ContentKind::Global,
            cardinality: Cardinality::Flat,
            fields: FieldMap::new(),
        }
    }

    /// Switch to repeatable cardinality (multi-row globals).
    pub fn repeatable(mut self) -> Self {
        self.cardinality = Cardinality::Repeatable;
        self
    }

    /// Add a field.
    pub fn with_field(mut self, name: impl Into<String>, field: FieldDefinition) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }
}

/// Validate a content-type or field slug.
///
/// Slugs feed the table naming convention, so they are held to the same
/// shape the identifier guard enforces: lowercase ascii start, then
/// lowercase/digit/underscore.
pub fn validate_slug(slug: &str) -> Result<&str, crate::SchemaError> {
    let mut chars = slug.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(slug)
    } else {
        Err(crate::SchemaError::InvalidSlug(slug.to_string()))
    }
}
