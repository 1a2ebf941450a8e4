use crate::error::{Result, StateError};
use crate::identity::IdentityResolver;
use crate::model::{EnforcementState, ProjectState, ProjectSummary};
use recall_cache::{BoundedCache, PathLocks};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const STATE_FILE: &str = "state.json";
pub const ENFORCEMENT_FILE: &str = "enforcement-state.json";

const DEFAULT_CACHE_CAPACITY: usize = 50;
const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct StateStoreConfig {
    /// Root under which `projects/<id>/` directories live.
    pub home: PathBuf,
    pub cache_capacity: usize,
    pub debounce: Duration,
}

impl StateStoreConfig {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// `$RECALL_HOME`, falling back to `~/.recall`.
    pub fn default_home() -> PathBuf {
        if let Ok(home) = std::env::var("RECALL_HOME") {
            if !home.trim().is_empty() {
                return PathBuf::from(home);
            }
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".recall")
    }
}

/// Read-through cache plus debounced durable writer for [`ProjectState`].
///
/// `save` always updates the in-memory cache synchronously; only the disk
/// write is deferred. The debounce timer is single-flight: at most one
/// pending flush task exists at a time, and a new dirty mark while one is
/// scheduled only ensures the project lands in that flush's snapshot.
/// Every durable write of a project's state file is protected by that
/// project's path lock, so debounced, immediate and flush paths never race
/// each other on the same file.
pub struct ProjectStateStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    home: PathBuf,
    debounce: Duration,
    cache: Mutex<BoundedCache<String, ProjectState>>,
    dirty: Mutex<DirtyState>,
    locks: PathLocks,
    identity: Arc<IdentityResolver>,
}

#[derive(Default)]
struct DirtyState {
    ids: HashSet<String>,
    timer: Option<JoinHandle<()>>,
}

impl ProjectStateStore {
    pub fn new(config: StateStoreConfig) -> Self {
        Self::with_resolver(config, Arc::new(IdentityResolver::new()))
    }

    /// Share one [`IdentityResolver`] (and its cache) with other components.
    pub fn with_resolver(config: StateStoreConfig, identity: Arc<IdentityResolver>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                home: config.home,
                debounce: config.debounce,
                cache: Mutex::new(BoundedCache::new(config.cache_capacity)),
                dirty: Mutex::new(DirtyState::default()),
                locks: PathLocks::new(),
                identity,
            }),
        }
    }

    pub fn home(&self) -> &Path {
        &self.inner.home
    }

    pub async fn resolve_identity(&self, working_dir: &Path) -> String {
        self.inner.identity.resolve(working_dir).await
    }

    /// Resolve the working directory to a project and return its state,
    /// loading from disk or creating (and immediately persisting) a fresh
    /// one when nothing exists yet.
    pub async fn get(&self, working_dir: &Path) -> Result<ProjectState> {
        let resolved = working_dir
            .canonicalize()
            .unwrap_or_else(|_| working_dir.to_path_buf());
        let project_id = self.inner.identity.resolve(&resolved).await;

        if let Some(state) = lock(&self.inner.cache).get(&project_id).cloned() {
            return Ok(state);
        }

        let path = self.inner.state_path(&project_id);
        {
            let _guard = self.inner.locks.acquire(&path).await;
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<ProjectState>(&bytes) {
                    Ok(state) => {
                        lock(&self.inner.cache).set(project_id.clone(), state.clone());
                        return Ok(state);
                    }
                    Err(err) => {
                        log::warn!(
                            "corrupt state file {}, rebuilding: {err}",
                            path.display()
                        );
                    }
                },
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    log::warn!("cannot read state file {}: {err}", path.display());
                }
            }
        }

        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        let state = ProjectState::new(project_id, name, resolved);
        self.save(state.clone(), true).await?;
        Ok(state)
    }

    /// Update the cache synchronously; write to disk now (`immediate`) or
    /// via the debounced single-flight timer. Multiple debounced saves for
    /// the same project within the delay window coalesce into one write
    /// carrying the latest value.
    pub async fn save(&self, state: ProjectState, immediate: bool) -> Result<()> {
        let project_id = state.project_id.clone();
        lock(&self.inner.cache).set(project_id.clone(), state.clone());

        if immediate {
            return self.inner.write_state(&state).await;
        }

        let mut dirty = lock(&self.inner.dirty);
        dirty.ids.insert(project_id);
        let needs_timer = dirty
            .timer
            .as_ref()
            .map_or(true, JoinHandle::is_finished);
        if needs_timer {
            let inner = Arc::clone(&self.inner);
            dirty.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(inner.debounce).await;
                let failures = inner.flush_dirty().await;
                for (id, reason) in failures {
                    log::error!("debounced write failed for {id}, left dirty: {reason}");
                }
            }));
        }
        Ok(())
    }

    /// Cancel any pending debounce timer and synchronously attempt to write
    /// every dirty project. Failures leave their projects dirty and surface
    /// as one aggregated [`StateError::FlushFailed`].
    pub async fn flush(&self) -> Result<()> {
        if let Some(timer) = lock(&self.inner.dirty).timer.take() {
            timer.abort();
        }

        let failures = self.inner.flush_dirty().await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(StateError::FlushFailed { failed: failures })
        }
    }

    pub fn dirty_count(&self) -> usize {
        lock(&self.inner.dirty).ids.len()
    }

    /// Enumerate all on-disk projects, skipping unreadable or corrupt
    /// state files rather than aborting the listing.
    pub async fn list(&self) -> Vec<ProjectSummary> {
        let mut summaries = Vec::new();
        let projects_dir = self.inner.home.join("projects");

        let mut entries = match tokio::fs::read_dir(&projects_dir).await {
            Ok(entries) => entries,
            Err(_) => return summaries,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let state_file = entry.path().join(STATE_FILE);
            let bytes = match tokio::fs::read(&state_file).await {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };
            match serde_json::from_slice::<ProjectState>(&bytes) {
                Ok(state) => summaries.push(ProjectSummary {
                    id: state.project_id,
                    name: state.project_name,
                    phase: state.phase,
                    last_activity_ms: state.last_activity_ms,
                }),
                Err(err) => {
                    log::warn!("skipping corrupt state file {}: {err}", state_file.display());
                }
            }
        }
        summaries
    }
}

impl StoreInner {
    fn state_path(&self, project_id: &str) -> PathBuf {
        self.home.join("projects").join(project_id).join(STATE_FILE)
    }

    fn enforcement_path(&self, project_id: &str) -> PathBuf {
        self.home
            .join("projects")
            .join(project_id)
            .join(ENFORCEMENT_FILE)
    }

    /// Durably write one project's state plus its enforcement projection,
    /// both under the project's path lock, both atomically (tmp + rename).
    async fn write_state(&self, state: &ProjectState) -> Result<()> {
        let path = self.state_path(&state.project_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let _guard = self.locks.acquire(&path).await;

        let body = serde_json::to_vec_pretty(state)?;
        write_atomic(&path, &body).await?;

        let projection = EnforcementState::from(state);
        let body = serde_json::to_vec_pretty(&projection)?;
        write_atomic(&self.enforcement_path(&state.project_id), &body).await?;

        log::debug!("wrote state for {}", state.project_id);
        Ok(())
    }

    /// Write every currently dirty project, removing an id from the dirty
    /// set only after its write succeeds. Returns (id, reason) per failure.
    async fn flush_dirty(&self) -> Vec<(String, String)> {
        let snapshot: Vec<String> = lock(&self.dirty).ids.iter().cloned().collect();
        let mut failures = Vec::new();

        for project_id in snapshot {
            let state = lock(&self.cache).get(&project_id).cloned();
            match state {
                Some(state) => match self.write_state(&state).await {
                    Ok(()) => {
                        lock(&self.dirty).ids.remove(&project_id);
                    }
                    Err(err) => {
                        failures.push((project_id, err.to_string()));
                    }
                },
                // Evicted from the cache before the flush ran; the last
                // durable write is all we have, nothing newer to persist.
                None => {
                    lock(&self.dirty).ids.remove(&project_id);
                }
            }
        }
        failures
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

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
