use crate::embedder::{Embedder, HashEmbedder};
use crate::index::IndexBackend;
use crate::injector::SmartContextInjector;
use crate::manager::ProjectMemoryManager;
use recall_state::{IdentityResolver, ProjectStateStore, StateStoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application wiring for one recall home directory.
pub struct AppConfig {
    pub home: PathBuf,
    pub debounce: Duration,
    pub backend: IndexBackend,
    pub embedder: Arc<dyn Embedder>,
}

impl AppConfig {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            debounce: Duration::from_secs(2),
            backend: IndexBackend::Persistent,
            embedder: Arc::new(HashEmbedder::new()),
        }
    }

    /// `$RECALL_HOME` or `~/.recall`.
    pub fn from_env() -> Self {
        Self::new(StateStoreConfig::default_home())
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_backend(mut self, backend: IndexBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }
}

/// The assembled application: project state store, memory manager and
/// context injector, all sharing one identity resolver so state and memory
/// can never disagree about which project a directory belongs to.
pub struct AppContext {
    pub states: ProjectStateStore,
    pub memories: Arc<ProjectMemoryManager>,
    pub injector: SmartContextInjector,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        let identity = Arc::new(IdentityResolver::new());

        let states = ProjectStateStore::with_resolver(
            StateStoreConfig::new(&config.home).with_debounce(config.debounce),
            Arc::clone(&identity),
        );
        let memories = Arc::new(ProjectMemoryManager::new(
            config.home.join("memory"),
            config.backend,
            config.embedder,
            identity,
        ));
        let injector = SmartContextInjector::new(Arc::clone(&memories));

        Self {
            states,
            memories,
            injector,
        }
    }
}
