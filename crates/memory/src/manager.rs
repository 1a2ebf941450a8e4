use crate::embedder::Embedder;
use crate::error::{MemoryError, Result};
use crate::index::IndexBackend;
use crate::memory::{ProjectMemory, MEMORY_METADATA_FILE};
use recall_state::{unix_ms_now, IdentityResolver};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Hands out [`ProjectMemory`] instances, one per project identifier, all
/// rooted under one memory directory.
///
/// This is the isolation boundary: before an instance is handed out, the
/// claimed identifier is checked against the identifier re-derived from the
/// caller's working directory, and the storage path is checked to stay
/// inside the memory root. Violations are [`MemoryError::Isolation`].
pub struct ProjectMemoryManager {
    memory_home: PathBuf,
    backend: IndexBackend,
    embedder: Arc<dyn Embedder>,
    identity: Arc<IdentityResolver>,
    instances: Mutex<HashMap<String, Arc<ProjectMemory>>>,
}

impl ProjectMemoryManager {
    pub fn new(
        memory_home: impl Into<PathBuf>,
        backend: IndexBackend,
        embedder: Arc<dyn Embedder>,
        identity: Arc<IdentityResolver>,
    ) -> Self {
        Self {
            memory_home: memory_home.into(),
            backend,
            embedder,
            identity,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn memory_home(&self) -> &Path {
        &self.memory_home
    }

    /// The memory for `project_id`, created on first use. With a working
    /// directory the claimed id must match the one derived from it.
    pub async fn get_memory(
        &self,
        project_id: &str,
        working_dir: Option<&Path>,
    ) -> Result<Arc<ProjectMemory>> {
        if let Some(dir) = working_dir {
            self.validate_isolation(project_id, dir).await?;
        }
        let root = self.project_path(project_id)?;

        let mut instances = self.instances.lock().await;
        if let Some(memory) = instances.get(project_id) {
            return Ok(Arc::clone(memory));
        }

        let memory = Arc::new(ProjectMemory::new(
            project_id,
            root,
            self.backend,
            Arc::clone(&self.embedder),
        ));
        instances.insert(project_id.to_string(), Arc::clone(&memory));
        Ok(memory)
    }

    /// A memory exists once its directory carries the metadata sidecar.
    pub async fn memory_exists(&self, project_id: &str) -> bool {
        let Ok(root) = self.project_path(project_id) else {
            return false;
        };
        tokio::fs::try_exists(root.join(MEMORY_METADATA_FILE))
            .await
            .unwrap_or(false)
    }

    pub async fn list_projects(&self) -> Result<Vec<String>> {
        let mut projects = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.memory_home).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(projects),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            // A directory without the sidecar is not an initialized memory.
            let initialized = tokio::fs::try_exists(entry.path().join(MEMORY_METADATA_FILE))
                .await
                .unwrap_or(false);
            if !initialized {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                projects.push(name.to_string());
            }
        }
        projects.sort();
        Ok(projects)
    }

    /// Drops in-memory instances idle longer than `max_age`. Disk state is
    /// untouched; the next `get_memory` reopens them.
    pub async fn cleanup_inactive(&self, max_age: Duration) -> usize {
        let now = unix_ms_now();
        let max_age_ms = max_age.as_millis() as u64;

        let mut instances = self.instances.lock().await;
        let before = instances.len();
        instances.retain(|_, memory| now.saturating_sub(memory.last_access_ms()) < max_age_ms);
        let dropped = before - instances.len();
        if dropped > 0 {
            log::info!("released {dropped} inactive memory instances");
        }
        dropped
    }

    async fn validate_isolation(&self, claimed_id: &str, working_dir: &Path) -> Result<()> {
        let derived = self.identity.resolve(working_dir).await;
        if derived != claimed_id {
            return Err(MemoryError::Isolation(format!(
                "project id {claimed_id} does not match {derived} derived from {}",
                working_dir.display()
            )));
        }
        Ok(())
    }

    /// Storage directory for a project id, rejected when the id would make
    /// the path leave the memory root.
    fn project_path(&self, project_id: &str) -> Result<PathBuf> {
        let candidate = normalize(&self.memory_home.join(project_id));
        if !candidate.starts_with(normalize(&self.memory_home)) || candidate == normalize(&self.memory_home) {
            return Err(MemoryError::Isolation(format!(
                "project id {project_id:?} escapes the memory root"
            )));
        }
        Ok(candidate)
    }
}

/// Lexical normalization, no filesystem access: `.` dropped, `..` pops.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
