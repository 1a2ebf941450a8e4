use crate::keywords::TaskType;
use crate::types::{MemoryDocument, ScoredResult};
use recall_state::unix_ms_now;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Relative weights of the score components. The defaults define what
/// "relevant" means to downstream filtering and formatting; keep them unless
/// you re-tune the whole pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub semantic: f32,
    pub keyword: f32,
    pub recency: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            semantic: 0.60,
            keyword: 0.25,
            recency: 0.15,
        }
    }
}

/// Pure scoring: semantic similarity, keyword overlap, recency and a
/// task-type bonus combined into one final score in [0, 1].
#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceScorer {
    weights: ScoreWeights,
}

impl RelevanceScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// `semantic_distance` is cosine distance in [0, 2] (0 = identical).
    pub fn score(
        &self,
        document: &MemoryDocument,
        semantic_distance: f32,
        keywords: &[String],
        task_type: TaskType,
        collection: &str,
    ) -> ScoredResult {
        let semantic_score = (1.0 - semantic_distance / 2.0).clamp(0.0, 1.0);

        let doc_text = format!(
            "{} {}",
            document.content,
            document.metadata_str("name").unwrap_or_default()
        )
        .to_lowercase();
        let matched = keywords.iter().filter(|kw| doc_text.contains(kw.as_str())).count();
        let keyword_score = matched as f32 / keywords.len().max(1) as f32;

        let recency_score = recency(document.updated_at_ms(), unix_ms_now());

        let doc_type = document.metadata_str("type").unwrap_or_default();
        let bonus = type_bonus(task_type, doc_type);

        let final_score = (self.weights.semantic * semantic_score
            + self.weights.keyword * keyword_score
            + self.weights.recency * recency_score
            + bonus)
            .clamp(0.0, 1.0);

        ScoredResult {
            document: document.clone(),
            semantic_score,
            keyword_score,
            recency_score,
            final_score,
            collection: collection.to_string(),
        }
    }
}

/// 1.0 within a day, 0.8 within a week, 0.5 within a month, else 0.2;
/// 0.5 when the timestamp is missing.
fn recency(updated_at_ms: Option<u64>, now_ms: u64) -> f32 {
    let Some(updated) = updated_at_ms else {
        return 0.5;
    };
    let age = now_ms.saturating_sub(updated);
    if age < DAY_MS {
        1.0
    } else if age < 7 * DAY_MS {
        0.8
    } else if age < 30 * DAY_MS {
        0.5
    } else {
        0.2
    }
}

/// Fixed additive bonus keyed by (task type, document's declared type).
fn type_bonus(task_type: TaskType, doc_type: &str) -> f32 {
    match (task_type, doc_type) {
        (TaskType::Bug, "function") => 0.10,
        (TaskType::Bug, "error") => 0.15,
        (TaskType::Feature, "architecture") => 0.10,
        (TaskType::Feature, "pattern") => 0.10,
        (TaskType::Database, "table") => 0.20,
        (TaskType::Database, "migration") => 0.15,
        (TaskType::Test, "test") => 0.20,
        (TaskType::Test, "spec") => 0.15,
        (TaskType::Refactor, "function") => 0.10,
        (TaskType::Refactor, "class") => 0.10,
        _ => 0.0,
    }
}
