use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata-equality filter: a document matches when every key/value pair
/// is present verbatim in its metadata.
pub type MetadataFilter = serde_json::Map<String, serde_json::Value>;

/// A document stored in one project's memory. Owned exclusively by one
/// project, never referenced across projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDocument {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl MemoryDocument {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn updated_at_ms(&self) -> Option<u64> {
        self.metadata.get("updated_at_ms").and_then(|v| v.as_u64())
    }
}

/// A search hit with its component scores. Ephemeral, constructed per query.
#[derive(Debug, Clone)]
pub struct ScoredResult {
    pub document: MemoryDocument,
    pub semantic_score: f32,
    pub keyword_score: f32,
    pub recency_score: f32,
    pub final_score: f32,
    /// Source collection name.
    pub collection: String,
}

/// Per-project memory statistics, merged from live index counts and the
/// metadata sidecar file.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub project_id: String,
    pub initialized_at_ms: Option<u64>,
    pub last_update_ms: Option<u64>,
    pub collections: HashMap<String, usize>,
    pub total_documents: usize,
    pub storage_bytes: u64,
}

pub(crate) fn matches_filter(metadata: &Metadata, filter: &MetadataFilter) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}
