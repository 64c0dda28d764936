//! Engine configuration.

/// Tunables for one [`crate::ContentEngine`] instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Prefix for every resolved URL, normally the site root.
    pub base_path: String,

    /// Upper bound on concurrent reads within one resolution phase.
    ///
    /// Applies uniformly to sibling fields, array rows, and junction-joined
    /// targets. Output order is never affected by this value.
    pub fan_out_limit: usize,

    /// Ceiling on relation-graph recursion depth.
    ///
    /// Past it, targets embed unresolved rather than recursing further.
    pub max_relation_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_path: "/".to_string(),
            fan_out_limit: 8,
            max_relation_depth: 12,
        }
    }
}

impl EngineConfig {
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_fan_out_limit(mut self, limit: usize) -> Self {
        self.fan_out_limit = limit;
        self
    }

    pub fn with_max_relation_depth(mut self, depth: usize) -> Self {
        self.max_relation_depth = depth;
        self
    }
}
