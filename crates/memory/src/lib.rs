//! # Recall Memory
//!
//! Isolated per-project semantic memory with relevance ranking and
//! smart context injection.
//!
//! ## Pipeline
//!
//! ```text
//! task description
//!     │
//!     ├──> KeywordExtractor (stop-words, synonym expansion, task type)
//!     │
//!     ├──> ProjectMemory (per-collection VectorIndex, Embedder)
//!     │      └─> (document, cosine distance) candidates
//!     │
//!     ├──> RelevanceScorer (semantic / keyword / recency / type bonus)
//!     │
//!     └──> ContextFormatter
//!            └─> categorized digest, cached per (project, description)
//! ```
//!
//! Every project identifier owns exactly one memory directory under the
//! memory root; [`ProjectMemoryManager`] re-derives the identifier from the
//! caller's working directory and refuses mismatches or paths escaping the
//! root with [`MemoryError::Isolation`].

mod collections;
mod context;
mod embedder;
mod error;
mod formatter;
mod index;
mod injector;
mod keywords;
mod manager;
mod memory;
mod scoring;
mod types;

pub use collections::{Collection, QueryScope};
pub use context::{AppConfig, AppContext};
pub use embedder::{Embedder, HashEmbedder};
pub use error::{MemoryError, Result};
pub use formatter::{ContextFormatter, MAX_RESULTS_PER_CATEGORY};
pub use index::{cosine_distance, CosineIndex, IndexBackend, IndexRecord, NoopIndex, VectorIndex};
pub use injector::{SmartContextInjector, MEMORY_NOT_INITIALIZED_HINT, NO_RELEVANT_CONTEXT};
pub use keywords::{should_index_file, KeywordExtractor, TaskType};
pub use manager::ProjectMemoryManager;
pub use memory::{derive_doc_id, ProjectMemory, MEMORY_METADATA_FILE};
pub use scoring::{RelevanceScorer, ScoreWeights};
pub use types::{MemoryDocument, MemoryStats, Metadata, MetadataFilter, ScoredResult};
