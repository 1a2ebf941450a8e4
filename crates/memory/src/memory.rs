use crate::collections::{Collection, QueryScope};
use crate::embedder::Embedder;
use crate::error::{MemoryError, Result};
use crate::index::{CosineIndex, IndexBackend, IndexRecord, NoopIndex, VectorIndex};
use crate::types::{MemoryDocument, MemoryStats, Metadata, MetadataFilter};
use recall_state::{hash16, unix_ms_now};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Sidecar file next to the collection indexes. Its presence marks the
/// memory as initialized.
pub const MEMORY_METADATA_FILE: &str = "metadata.json";

/// Stable content-derived document id. Same collection and same leading
/// content always map to the same id, which is what makes `add` idempotent.
pub fn derive_doc_id(collection: Collection, content: &str) -> String {
    let prefix: String = content.chars().take(100).collect();
    hash16(format!("{}:{}", collection.name(), prefix).as_bytes())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryMetadata {
    initialized_at_ms: Option<u64>,
    last_update_ms: Option<u64>,
}

/// One project's memory: a fixed set of collections, each backed by its own
/// vector index under the project's directory. All writes stamp
/// `updated_at_ms` so recency scoring has something to work with.
pub struct ProjectMemory {
    project_id: String,
    root: PathBuf,
    backend: IndexBackend,
    embedder: Arc<dyn Embedder>,
    indexes: OnceCell<HashMap<Collection, Arc<dyn VectorIndex>>>,
    last_access_ms: AtomicU64,
}

impl std::fmt::Debug for ProjectMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectMemory")
            .field("project_id", &self.project_id)
            .field("root", &self.root)
            .field("backend", &self.backend)
            .field("last_access_ms", &self.last_access_ms)
            .finish_non_exhaustive()
    }
}

impl ProjectMemory {
    pub fn new(
        project_id: impl Into<String>,
        root: impl Into<PathBuf>,
        backend: IndexBackend,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            root: root.into(),
            backend,
            embedder,
            indexes: OnceCell::new(),
            last_access_ms: AtomicU64::new(unix_ms_now()),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Unix-ms timestamp of the last operation through this instance.
    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        self.last_access_ms.store(unix_ms_now(), Ordering::Relaxed);
    }

    /// Lazy first-use initialization: creates the directory, opens every
    /// collection index and stamps the sidecar.
    async fn indexes(&self) -> Result<&HashMap<Collection, Arc<dyn VectorIndex>>> {
        self.indexes
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.root).await?;

                let mut indexes: HashMap<Collection, Arc<dyn VectorIndex>> = HashMap::new();
                for collection in Collection::ALL {
                    let index: Arc<dyn VectorIndex> = match self.backend {
                        IndexBackend::Persistent => {
                            let path = self.root.join(format!("{collection}.json"));
                            Arc::new(CosineIndex::open(path, self.embedder.dimension()).await?)
                        }
                        IndexBackend::Noop => Arc::new(NoopIndex),
                    };
                    indexes.insert(collection, index);
                }

                let meta_path = self.root.join(MEMORY_METADATA_FILE);
                if tokio::fs::try_exists(&meta_path).await? {
                    log::debug!("memory {} already initialized", self.project_id);
                } else {
                    let meta = MemoryMetadata {
                        initialized_at_ms: Some(unix_ms_now()),
                        last_update_ms: None,
                    };
                    write_atomic(&meta_path, &serde_json::to_vec_pretty(&meta)?).await?;
                    log::info!("initialized memory for project {}", self.project_id);
                }

                Ok(indexes)
            })
            .await
    }

    fn index(
        &self,
        indexes: &HashMap<Collection, Arc<dyn VectorIndex>>,
        collection: Collection,
    ) -> Arc<dyn VectorIndex> {
        // Every collection is opened in indexes(), so the lookup cannot miss.
        Arc::clone(&indexes[&collection])
    }

    async fn read_metadata(&self) -> MemoryMetadata {
        match tokio::fs::read(self.root.join(MEMORY_METADATA_FILE)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => MemoryMetadata::default(),
        }
    }

    async fn mark_updated(&self) {
        let mut meta = self.read_metadata().await;
        meta.last_update_ms = Some(unix_ms_now());
        if let Ok(bytes) = serde_json::to_vec_pretty(&meta) {
            let path = self.root.join(MEMORY_METADATA_FILE);
            if let Err(err) = write_atomic(&path, &bytes).await {
                log::warn!("failed to update memory metadata for {}: {err}", self.project_id);
            }
        }
    }

    async fn store(
        &self,
        collection: Collection,
        content: &str,
        mut metadata: Metadata,
        id: Option<String>,
        replace: bool,
    ) -> Result<String> {
        self.touch();
        let indexes = self.indexes().await?;
        let vector = self.embedder.embed(content).await?;

        let id = id.unwrap_or_else(|| derive_doc_id(collection, content));
        metadata.insert("updated_at_ms".into(), unix_ms_now().into());
        metadata.insert("collection".into(), collection.name().into());

        let record = IndexRecord {
            id: id.clone(),
            content: content.to_string(),
            vector,
            metadata,
        };
        self.index(indexes, collection).put(vec![record], replace).await?;
        self.mark_updated().await;
        Ok(id)
    }

    /// Idempotent insert: an existing id is left untouched.
    pub async fn add(
        &self,
        collection: Collection,
        content: &str,
        metadata: Metadata,
        id: Option<String>,
    ) -> Result<String> {
        self.store(collection, content, metadata, id, false).await
    }

    /// Insert-or-replace by id.
    pub async fn upsert(
        &self,
        collection: Collection,
        content: &str,
        metadata: Metadata,
        id: Option<String>,
    ) -> Result<String> {
        self.store(collection, content, metadata, id, true).await
    }

    /// Nearest documents across the scope, with cosine distances and source
    /// collections, ascending by distance. A failing collection is logged
    /// and skipped so one bad index never empties the whole result.
    pub async fn query(
        &self,
        scope: QueryScope,
        query_text: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(MemoryDocument, f32, Collection)>> {
        self.touch();
        let indexes = self.indexes().await?;
        let vector = self.embedder.embed(query_text).await?;

        let mut merged = Vec::new();
        for collection in scope.collections() {
            match self.index(indexes, collection).query(&vector, limit, filter).await {
                Ok(hits) => {
                    merged.extend(hits.into_iter().map(|(doc, dist)| (doc, dist, collection)));
                }
                Err(err) => {
                    log::warn!(
                        "query failed for {}/{collection}: {err}",
                        self.project_id
                    );
                }
            }
        }

        merged.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        // Keep headroom above `limit` so reranking still has candidates to
        // promote from further down the distance order.
        merged.truncate(limit.saturating_mul(2));
        Ok(merged)
    }

    pub async fn get(&self, collection: Collection, id: &str) -> Result<Option<MemoryDocument>> {
        self.touch();
        let indexes = self.indexes().await?;
        let ids = [id.to_string()];
        let docs = self.index(indexes, collection).fetch(Some(&ids), None).await?;
        Ok(docs.into_iter().next())
    }

    pub async fn get_all(
        &self,
        collection: Collection,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<MemoryDocument>> {
        self.touch();
        let indexes = self.indexes().await?;
        self.index(indexes, collection).fetch(None, filter).await
    }

    /// Delete by explicit ids, or by filter when no ids are given. Returns
    /// how many documents were actually removed.
    pub async fn delete(
        &self,
        collection: Collection,
        ids: Option<&[String]>,
        filter: Option<&MetadataFilter>,
    ) -> Result<usize> {
        self.touch();
        let indexes = self.indexes().await?;
        let index = self.index(indexes, collection);

        let target_ids: Vec<String> = match (ids, filter) {
            (Some(ids), _) => ids.to_vec(),
            (None, Some(filter)) => index
                .fetch(None, Some(filter))
                .await?
                .into_iter()
                .map(|doc| doc.id)
                .collect(),
            (None, None) => return Ok(0),
        };
        if target_ids.is_empty() {
            return Ok(0);
        }

        let removed = index.delete(&target_ids).await?;
        if removed > 0 {
            self.mark_updated().await;
        }
        Ok(removed)
    }

    pub async fn clear_collection(&self, collection: Collection) -> Result<usize> {
        self.touch();
        let indexes = self.indexes().await?;
        let index = self.index(indexes, collection);
        let ids: Vec<String> = index
            .fetch(None, None)
            .await?
            .into_iter()
            .map(|doc| doc.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = index.delete(&ids).await?;
        self.mark_updated().await;
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<MemoryStats> {
        self.touch();
        let indexes = self.indexes().await?;

        let mut collections = HashMap::new();
        let mut total = 0;
        for collection in Collection::ALL {
            let count = self.index(indexes, collection).count().await;
            collections.insert(collection.name().to_string(), count);
            total += count;
        }

        let meta = self.read_metadata().await;
        let root = self.root.clone();
        let storage_bytes = tokio::task::spawn_blocking(move || dir_size(&root))
            .await
            .unwrap_or(0);

        Ok(MemoryStats {
            project_id: self.project_id.clone(),
            initialized_at_ms: meta.initialized_at_ms,
            last_update_ms: meta.last_update_ms,
            collections,
            total_documents: total,
            storage_bytes,
        })
    }

    // String-boundary variants for callers holding raw collection names.
    // Each picks the failure mode the operation's contract calls for.

    /// Unknown collection names are a caller error here.
    pub async fn add_named(
        &self,
        collection: &str,
        content: &str,
        metadata: Metadata,
        id: Option<String>,
    ) -> Result<String> {
        let collection = Collection::parse(collection)
            .ok_or_else(|| MemoryError::UnknownCollection(collection.to_string()))?;
        self.add(collection, content, metadata, id).await
    }

    /// Unknown scopes read as "nothing matches", not as an error.
    pub async fn query_named(
        &self,
        scope: &str,
        query_text: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(MemoryDocument, f32, Collection)>> {
        match QueryScope::parse(scope) {
            Some(scope) => self.query(scope, query_text, limit, filter).await,
            None => Ok(Vec::new()),
        }
    }

    /// Deleting from an unknown collection removes nothing.
    pub async fn delete_named(
        &self,
        collection: &str,
        ids: Option<&[String]>,
        filter: Option<&MetadataFilter>,
    ) -> Result<usize> {
        match Collection::parse(collection) {
            Some(collection) => self.delete(collection, ids, filter).await,
            None => Ok(0),
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                dir_size(&path)
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn memory(dir: &TempDir) -> ProjectMemory {
        ProjectMemory::new(
            "test-project",
            dir.path().join("test-project"),
            IndexBackend::Persistent,
            Arc::new(HashEmbedder::new()),
        )
    }

    #[test]
    fn doc_ids_are_stable_and_collection_scoped() {
        let a = derive_doc_id(Collection::Functions, "fn login()");
        let b = derive_doc_id(Collection::Functions, "fn login()");
        let c = derive_doc_id(Collection::Learnings, "fn login()");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn doc_id_uses_at_most_hundred_chars() {
        let long_a = format!("{}{}", "x".repeat(100), "tail one");
        let long_b = format!("{}{}", "x".repeat(100), "tail two");
        assert_eq!(
            derive_doc_id(Collection::Learnings, &long_a),
            derive_doc_id(Collection::Learnings, &long_b)
        );
    }

    #[tokio::test]
    async fn add_is_idempotent_and_upsert_replaces() {
        let dir = TempDir::new().unwrap();
        let memory = memory(&dir);

        let mut meta = Metadata::new();
        meta.insert("type".into(), json!("function"));
        let id = memory
            .add(Collection::Functions, "fn login()", meta.clone(), None)
            .await
            .unwrap();

        // Same content, different metadata: the original wins.
        let mut other = Metadata::new();
        other.insert("type".into(), json!("changed"));
        let id_again = memory
            .add(Collection::Functions, "fn login()", other.clone(), None)
            .await
            .unwrap();
        assert_eq!(id, id_again);
        let doc = memory.get(Collection::Functions, &id).await.unwrap().unwrap();
        assert_eq!(doc.metadata_str("type"), Some("function"));

        memory
            .upsert(Collection::Functions, "fn login()", other, Some(id.clone()))
            .await
            .unwrap();
        let doc = memory.get(Collection::Functions, &id).await.unwrap().unwrap();
        assert_eq!(doc.metadata_str("type"), Some("changed"));
    }

    #[tokio::test]
    async fn writes_stamp_timestamp_and_collection() {
        let dir = TempDir::new().unwrap();
        let memory = memory(&dir);

        let id = memory
            .add(Collection::Learnings, "prefer small modules", Metadata::new(), None)
            .await
            .unwrap();
        let doc = memory.get(Collection::Learnings, &id).await.unwrap().unwrap();
        assert!(doc.updated_at_ms().is_some());
        assert_eq!(doc.metadata_str("collection"), Some("learnings"));
    }

    #[tokio::test]
    async fn query_scopes_and_merges_collections() {
        let dir = TempDir::new().unwrap();
        let memory = memory(&dir);

        memory
            .add(Collection::Functions, "authentication login handler", Metadata::new(), None)
            .await
            .unwrap();
        memory
            .add(Collection::Learnings, "authentication login handler notes", Metadata::new(), None)
            .await
            .unwrap();

        let all = memory
            .query(QueryScope::All, "authentication login handler", 5, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let scoped = memory
            .query(QueryScope::Named(Collection::Functions), "authentication login handler", 5, None)
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].2, Collection::Functions);
    }

    #[tokio::test]
    async fn delete_by_ids_and_by_filter() {
        let dir = TempDir::new().unwrap();
        let memory = memory(&dir);

        let mut rust_meta = Metadata::new();
        rust_meta.insert("lang".into(), json!("rust"));
        let mut py_meta = Metadata::new();
        py_meta.insert("lang".into(), json!("python"));

        let id = memory
            .add(Collection::CodeStructure, "src/lib.rs module tree", rust_meta, None)
            .await
            .unwrap();
        memory
            .add(Collection::CodeStructure, "app.py entry point", py_meta, None)
            .await
            .unwrap();

        let mut filter = MetadataFilter::new();
        filter.insert("lang".into(), json!("python"));
        let removed = memory
            .delete(Collection::CodeStructure, None, Some(&filter))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let removed = memory
            .delete(Collection::CodeStructure, Some(&[id]), None)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(memory.get_all(Collection::CodeStructure, None).await.unwrap().is_empty());

        // Neither ids nor filter: nothing happens.
        let removed = memory.delete(Collection::CodeStructure, None, None).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let memory = memory(&dir);
            memory
                .add(Collection::Architecture, "hexagonal layering", Metadata::new(), None)
                .await
                .unwrap()
        };

        let reopened = memory(&dir);
        let doc = reopened.get(Collection::Architecture, &id).await.unwrap();
        assert!(doc.is_some());
    }

    #[tokio::test]
    async fn stats_reflect_contents_and_sidecar() {
        let dir = TempDir::new().unwrap();
        let memory = memory(&dir);

        memory
            .add(Collection::Functions, "fn a()", Metadata::new(), None)
            .await
            .unwrap();
        memory
            .add(Collection::Functions, "fn b()", Metadata::new(), None)
            .await
            .unwrap();

        let stats = memory.stats().await.unwrap();
        assert_eq!(stats.project_id, "test-project");
        assert_eq!(stats.collections["functions"], 2);
        assert_eq!(stats.collections["learnings"], 0);
        assert_eq!(stats.total_documents, 2);
        assert!(stats.initialized_at_ms.is_some());
        assert!(stats.last_update_ms.is_some());
        assert!(stats.storage_bytes > 0);
    }

    #[tokio::test]
    async fn sidecar_updates_keep_init_timestamp_and_leave_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let memory = memory(&dir);

        memory
            .add(Collection::Functions, "fn a()", Metadata::new(), None)
            .await
            .unwrap();
        let initialized = memory.stats().await.unwrap().initialized_at_ms;

        memory
            .add(Collection::Functions, "fn b()", Metadata::new(), None)
            .await
            .unwrap();
        memory.clear_collection(Collection::Functions).await.unwrap();

        let stats = memory.stats().await.unwrap();
        assert_eq!(stats.initialized_at_ms, initialized);
        assert!(stats.last_update_ms.is_some());

        // Every sidecar write went through rename; nothing half-written stays.
        let leftovers: Vec<_> = std::fs::read_dir(memory.root())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn failed_sidecar_rename_cleans_up_and_degrades() {
        let dir = TempDir::new().unwrap();
        let memory = memory(&dir);
        memory
            .add(Collection::Functions, "fn a()", Metadata::new(), None)
            .await
            .unwrap();

        // A directory where the sidecar lives defeats the rename; the write
        // degrades with a warning instead of failing the operation.
        let meta_path = memory.root().join(MEMORY_METADATA_FILE);
        std::fs::remove_file(&meta_path).unwrap();
        std::fs::create_dir(&meta_path).unwrap();

        memory
            .add(Collection::Functions, "fn b()", Metadata::new(), None)
            .await
            .unwrap();
        assert!(!memory.root().join("metadata.json.tmp").exists());
    }

    #[tokio::test]
    async fn named_boundaries_pick_their_failure_modes() {
        let dir = TempDir::new().unwrap();
        let memory = memory(&dir);

        let err = memory
            .add_named("no_such", "content", Metadata::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::UnknownCollection(_)));

        let hits = memory.query_named("no_such", "content", 5, None).await.unwrap();
        assert!(hits.is_empty());

        let removed = memory.delete_named("no_such", None, None).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn noop_backend_accepts_and_returns_nothing() {
        let dir = TempDir::new().unwrap();
        let memory = ProjectMemory::new(
            "noop",
            dir.path().join("noop"),
            IndexBackend::Noop,
            Arc::new(HashEmbedder::new()),
        );

        memory
            .add(Collection::Functions, "fn x()", Metadata::new(), None)
            .await
            .unwrap();
        let hits = memory.query(QueryScope::All, "fn x()", 5, None).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(memory.stats().await.unwrap().total_documents, 0);
    }
}
