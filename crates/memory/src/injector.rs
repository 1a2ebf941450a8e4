use crate::collections::QueryScope;
use crate::error::{MemoryError, Result};
use crate::formatter::ContextFormatter;
use crate::keywords::{KeywordExtractor, TaskType};
use crate::manager::ProjectMemoryManager;
use crate::scoring::RelevanceScorer;
use recall_cache::TtlCache;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returned when a project has no memory yet. Callers key off the phrase
/// "not initialized".
pub const MEMORY_NOT_INITIALIZED_HINT: &str =
    "Project memory is not initialized. Index the project first to enable context injection.";

/// Returned when the memory exists but nothing scored above the relevance
/// threshold.
pub const NO_RELEVANT_CONTEXT: &str = "No relevant context found in project memory.";

const CONTEXT_CACHE_CAPACITY: usize = 100;
const CONTEXT_CACHE_TTL: Duration = Duration::from_secs(300);
const RELEVANCE_THRESHOLD: f32 = 0.5;
const MAX_RESULTS: usize = 8;
const CACHE_KEY_CHARS: usize = 50;

/// Turns a task description into a formatted context digest for one project.
///
/// Pipeline: keyword extraction and expansion, task-type detection, a query
/// across every collection, relevance scoring, threshold filtering and
/// formatting. Digests are cached per (project, description prefix) with a
/// short TTL so repeated prompts do not re-run the pipeline.
pub struct SmartContextInjector {
    manager: Arc<ProjectMemoryManager>,
    scorer: RelevanceScorer,
    cache: Mutex<TtlCache<String, String>>,
}

impl SmartContextInjector {
    pub fn new(manager: Arc<ProjectMemoryManager>) -> Self {
        Self {
            manager,
            scorer: RelevanceScorer::new(),
            cache: Mutex::new(TtlCache::new(CONTEXT_CACHE_CAPACITY, CONTEXT_CACHE_TTL)),
        }
    }

    /// Context digest for a task description. Always produces a usable
    /// string; only isolation violations surface as errors. Internal
    /// failures degrade to [`NO_RELEVANT_CONTEXT`] with a warning.
    pub async fn get_context(
        &self,
        project_id: &str,
        description: &str,
        working_dir: Option<&Path>,
    ) -> Result<String> {
        if !self.manager.memory_exists(project_id).await {
            return Ok(MEMORY_NOT_INITIALIZED_HINT.to_string());
        }

        let key = cache_key(project_id, description);
        if let Some(cached) = lock(&self.cache).get(&key) {
            log::debug!("context cache hit for {project_id}");
            return Ok(cached.clone());
        }

        let memory = self.manager.get_memory(project_id, working_dir).await?;

        let (keywords, expanded) = KeywordExtractor::extract_and_expand(description);
        let task_type = TaskType::detect(description);
        let query_text = if keywords.is_empty() {
            description.to_string()
        } else {
            format!("{} {description}", keywords.join(" "))
        };

        let hits = match memory.query(QueryScope::All, &query_text, MAX_RESULTS, None).await {
            Ok(hits) => hits,
            Err(err @ MemoryError::Isolation(_)) => return Err(err),
            Err(err) => {
                log::warn!("context query failed for {project_id}: {err}");
                return Ok(NO_RELEVANT_CONTEXT.to_string());
            }
        };

        let mut scored: Vec<_> = hits
            .iter()
            .map(|(doc, distance, collection)| {
                self.scorer
                    .score(doc, *distance, &expanded, task_type, collection.name())
            })
            .collect();
        scored.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.retain(|result| result.final_score > RELEVANCE_THRESHOLD);
        scored.truncate(MAX_RESULTS);

        if scored.is_empty() {
            return Ok(NO_RELEVANT_CONTEXT.to_string());
        }

        let digest = ContextFormatter::format(&scored);
        lock(&self.cache).set(key, digest.clone());
        Ok(digest)
    }

    /// Drop every cached digest for a project, after its memory changed.
    pub fn invalidate_project(&self, project_id: &str) {
        let prefix = format!("{project_id}:");
        let mut cache = lock(&self.cache);
        let stale: Vec<String> = cache
            .items()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            cache.invalidate(key);
        }
        if !stale.is_empty() {
            log::debug!("invalidated {} cached digests for {project_id}", stale.len());
        }
    }
}

fn cache_key(project_id: &str, description: &str) -> String {
    let prefix: String = description.chars().take(CACHE_KEY_CHARS).collect();
    format!("{project_id}:{prefix}")
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
