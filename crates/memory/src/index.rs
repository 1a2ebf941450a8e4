use crate::error::{MemoryError, Result};
use crate::types::{matches_filter, MemoryDocument, Metadata, MetadataFilter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Which [`VectorIndex`] implementation a memory opens for its collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    /// Brute-force cosine index persisted as JSON. The real thing.
    Persistent,
    /// Discards writes, returns nothing. For installations without a
    /// vector store.
    Noop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub content: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl IndexRecord {
    fn document(&self) -> MemoryDocument {
        MemoryDocument {
            id: self.id.clone(),
            content: self.content.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// One collection's nearest-neighbor store. Distances are cosine distance
/// in [0, 2]: 0 = identical, 2 = opposite.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert records. With `replace` an existing id is overwritten;
    /// without, it is left untouched.
    async fn put(&self, records: Vec<IndexRecord>, replace: bool) -> Result<()>;

    /// `k` nearest records, ascending by distance, optionally pre-filtered
    /// by metadata equality.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(MemoryDocument, f32)>>;

    /// Fetch by explicit ids, by filter, or everything when both are `None`.
    async fn fetch(
        &self,
        ids: Option<&[String]>,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<MemoryDocument>>;

    /// Returns how many of the given ids were actually removed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    async fn count(&self) -> usize;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0)
}

/// Brute-force cosine index over one collection, persisted as a JSON map of
/// records. O(n) per query, which is fine at per-project collection sizes;
/// the [`VectorIndex`] seam is where an ANN structure would slot in.
pub struct CosineIndex {
    path: PathBuf,
    dimension: usize,
    records: RwLock<HashMap<String, IndexRecord>>,
}

impl CosineIndex {
    pub async fn open(path: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                log::warn!("corrupt index {}, starting empty: {err}", path.display());
                HashMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            dimension,
            records: RwLock::new(records),
        })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(MemoryError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    async fn persist(&self, records: &HashMap<String, IndexRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(err) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for CosineIndex {
    async fn put(&self, new_records: Vec<IndexRecord>, replace: bool) -> Result<()> {
        for record in &new_records {
            self.check_dimension(&record.vector)?;
        }

        let mut records = self.records.write().await;
        for record in new_records {
            if replace || !records.contains_key(&record.id) {
                records.insert(record.id.clone(), record);
            }
        }
        self.persist(&records).await
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(MemoryDocument, f32)>> {
        self.check_dimension(vector)?;

        let records = self.records.read().await;
        let mut hits: Vec<(MemoryDocument, f32)> = records
            .values()
            .filter(|record| filter.map_or(true, |f| matches_filter(&record.metadata, f)))
            .map(|record| (record.document(), cosine_distance(vector, &record.vector)))
            .collect();

        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn fetch(
        &self,
        ids: Option<&[String]>,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<MemoryDocument>> {
        let records = self.records.read().await;
        let documents = match ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| records.get(id))
                .filter(|record| filter.map_or(true, |f| matches_filter(&record.metadata, f)))
                .map(IndexRecord::document)
                .collect(),
            None => records
                .values()
                .filter(|record| filter.map_or(true, |f| matches_filter(&record.metadata, f)))
                .map(IndexRecord::document)
                .collect(),
        };
        Ok(documents)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut records = self.records.write().await;
        let mut removed = 0;
        for id in ids {
            if records.remove(id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.persist(&records).await?;
        }
        Ok(removed)
    }

    async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

pub struct NoopIndex;

#[async_trait]
impl VectorIndex for NoopIndex {
    async fn put(&self, _records: Vec<IndexRecord>, _replace: bool) -> Result<()> {
        Ok(())
    }

    async fn query(
        &self,
        _vector: &[f32],
        _k: usize,
        _filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(MemoryDocument, f32)>> {
        Ok(Vec::new())
    }

    async fn fetch(
        &self,
        _ids: Option<&[String]>,
        _filter: Option<&MetadataFilter>,
    ) -> Result<Vec<MemoryDocument>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _ids: &[String]) -> Result<usize> {
        Ok(0)
    }

    async fn count(&self) -> usize {
        0
    }
}
